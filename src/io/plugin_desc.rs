use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

const DESCRIPTION_OFFSET: u64 = 64;
const DESCRIPTION_LEN: u64 = 260;

/// Reads the description string a plugin carries in its header: 260 bytes
/// at offset 64, terminated at the first zero byte. The offset and length
/// are a fixed on-disk layout assumption; a file too short to cover the
/// range yields whatever bytes it has, possibly none.
pub fn plugin_description(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(DESCRIPTION_OFFSET))?;
    let mut raw = Vec::with_capacity(DESCRIPTION_LEN as usize);
    file.take(DESCRIPTION_LEN).read_to_end(&mut raw)?;
    if let Some(end) = raw.iter().position(|&b| b == 0) {
        raw.truncate(end);
    }
    Ok(String::from_utf8_lossy(&raw).into_owned())
}
