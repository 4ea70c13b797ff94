use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use anyhow::Context;

pub fn read_file(path: &Path) -> anyhow::Result<String> {
    let mut buf = Vec::new();
    File::open(path)
        .with_context(|| format!("could not open '{}'", path.display()))?
        .read_to_end(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}

pub fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("could not write '{}'", path.display()))
}
