use anyhow::{Result, bail};
use flate2::read::GzDecoder;
use std::io::Read;
use xz2::read::XzDecoder;

/// Wraps `input` in the decompressor selected by `name`'s suffix. Selection
/// is by filename suffix, not magic-byte sniffing: the archives we handle
/// always arrive with their real names (a download path or an ar member
/// name).
pub fn reader_for<'a, R: Read + 'a>(
    name: &str,
    input: R,
) -> Result<Box<dyn Read + 'a>> {
    if name.ends_with(".gz") || name.ends_with(".tgz") {
        Ok(Box::new(GzDecoder::new(input)))
    } else if name.ends_with(".xz") {
        Ok(Box::new(XzDecoder::new(input)))
    } else if name.ends_with(".tar") {
        Ok(Box::new(input))
    } else {
        bail!("Unsupported archive suffix: {}", name)
    }
}
