use anyhow::{Context, Result, anyhow, bail};
use log::trace;
use std::io::Read;

/* Minimal unix `ar` reader, just enough to pull the data.tar member out of a
 * .deb container: an 8 byte magic, then 60 byte fixed-width member headers
 * with the payload size as decimal ASCII. Payloads are padded to even
 * offsets. */

pub const AR_MAGIC: &[u8; 8] = b"!<arch>\n";
const HEADER_LEN: usize = 60;
const NAME_RANGE: std::ops::Range<usize> = 0..16;
const SIZE_RANGE: std::ops::Range<usize> = 48..58;

#[derive(Debug)]
pub struct ArMember {
    pub name: String,
    pub size: u64,
}

/// Advances `reader` to the first byte of the payload of the first member
/// whose name begins with `data.tar`. All preceding members are skipped, not
/// buffered. After this returns, the next `size` bytes read from `reader`
/// are exactly the member payload.
pub fn seek_data_member<R: Read>(reader: &mut R) -> Result<ArMember> {
    let mut magic = [0u8; AR_MAGIC.len()];
    reader
        .read_exact(&mut magic)
        .context("Failed to read ar magic")?;
    if &magic != AR_MAGIC {
        bail!("Not an ar archive (bad magic)");
    }

    let mut header = [0u8; HEADER_LEN];
    loop {
        if !read_full(reader, &mut header)
            .context("Failed to read ar member header")?
        {
            bail!("No data.tar member found in ar archive");
        }

        let member = parse_header(&header)?;
        trace!("ar member: {} ({} bytes)", member.name, member.size);

        if member.name.starts_with("data.tar") {
            return Ok(member);
        }

        // Skip the payload plus the pad byte after odd-length payloads
        let skip = member.size + (member.size & 1);
        let copied = std::io::copy(
            &mut reader.by_ref().take(skip),
            &mut std::io::sink(),
        )
        .context("Failed to skip ar member payload")?;
        if copied != skip {
            bail!(
                "Truncated ar archive: member {} claims {} bytes",
                member.name,
                member.size
            );
        }
    }
}

fn parse_header(header: &[u8; HEADER_LEN]) -> Result<ArMember> {
    let name = std::str::from_utf8(&header[NAME_RANGE])
        .map_err(|_| anyhow!("ar member name is not valid UTF-8"))?
        .trim_end()
        .trim_end_matches('/')
        .to_string();

    let size_str = std::str::from_utf8(&header[SIZE_RANGE])
        .map_err(|_| anyhow!("ar member size is not valid UTF-8"))?
        .trim();
    let size: u64 = size_str.parse().context(format!(
        "Invalid ar member size {:?} for member {}",
        size_str, name
    ))?;

    Ok(ArMember { name, size })
}

/* Like read_exact, but distinguishes a clean end of archive (Ok(false)) from
 * a header truncated mid-way (Err). */
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            bail!("Truncated ar member header");
        }
        filled += n;
    }
    Ok(true)
}
