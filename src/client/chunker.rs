//! File chunking
//!
//! Files are split into fixed-size blocks named by the SHA-256 of their
//! bytes, in lowercase hex.

use std::collections::HashMap;
use std::path::Path;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Block size in bytes
pub const BLOCK_SIZE: usize = 4 * 1024;

/// A block of file content and its hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub hash: String,
    pub data: Vec<u8>,
}

impl Block {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            hash: hash_block(&data),
            data,
        }
    }
}

/// Content hash of a block
pub fn hash_block(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Split bytes into blocks. Only the last block may be short; empty input
/// gives no blocks.
pub fn split_blocks(data: &[u8]) -> Vec<Block> {
    data.chunks(BLOCK_SIZE).map(|chunk| Block::new(chunk.to_vec())).collect()
}

/// Read a file and split it into blocks
pub fn read_blocks(path: &Path) -> Result<Vec<Block>> {
    let data = std::fs::read(path)?;
    Ok(split_blocks(&data))
}

/// Hash every block of every regular file directly inside `dir`
pub fn scan_dir(dir: &Path) -> Result<HashMap<String, Vec<u8>>> {
    let mut blocks = HashMap::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        for block in read_blocks(&entry.path())? {
            blocks.insert(block.hash, block.data);
        }
    }

    tracing::debug!("Found {} local blocks in {}", blocks.len(), dir.display());
    Ok(blocks)
}

/// Write blocks to `path` in order, replacing any existing file
pub fn write_blocks(path: &Path, blocks: &[Vec<u8>]) -> Result<()> {
    use std::io::Write;

    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for block in blocks {
        file.write_all(block)?;
    }
    file.flush()?;
    Ok(())
}
