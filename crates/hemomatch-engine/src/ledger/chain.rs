use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{LedgerEntry, LedgerEvent};

pub const GENESIS: &str = "genesis";

fn line_hash(line: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(line.as_bytes()))
}

fn non_empty_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Append an event to the ledger, chaining it to the previous line.
///
/// Each entry's `prev_hash` is the SHA-256 of the previous line's exact
/// bytes; the first entry uses `genesis`. Returns the entry as written, so
/// callers can reuse its timestamp.
pub fn append_event(path: &Path, event: &LedgerEvent) -> Result<LedgerEntry> {
    let content = if path.exists() {
        std::fs::read_to_string(path)
            .with_context(|| format!("cannot read ledger {}", path.display()))?
    } else {
        String::new()
    };

    let (seq, prev_hash) = match non_empty_lines(&content).last() {
        Some((_, line)) => {
            let last: LedgerEntry = serde_json::from_str(line)
                .with_context(|| format!("{}: last ledger entry is invalid", path.display()))?;
            (last.seq + 1, line_hash(line))
        }
        None => (0, GENESIS.to_string()),
    };

    let entry = LedgerEntry {
        seq,
        prev_hash,
        ts: Utc::now(),
        event: event.clone(),
    };
    let line = serde_json::to_string(&entry)?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open ledger {}", path.display()))?;
    if !content.is_empty() && !content.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_data()?;

    debug!(seq, event = event.kind(), "ledger append");
    Ok(entry)
}

/// Read every entry. A missing ledger is empty.
pub fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read ledger {}", path.display()))?;
    non_empty_lines(&content)
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}: invalid entry at line {}", path.display(), i + 1))
        })
        .collect()
}

/// Verify the hash chain. Returns the number of entries.
pub fn verify_chain(path: &Path) -> Result<u64> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read ledger {}", path.display()))?;

    let mut count = 0u64;
    let mut prev_hash = GENESIS.to_string();
    for (i, line) in non_empty_lines(&content) {
        let entry: LedgerEntry = serde_json::from_str(line)
            .with_context(|| format!("invalid entry at line {}", i + 1))?;
        if entry.prev_hash != prev_hash {
            bail!(
                "ledger chain broken at entry {count}: expected prev_hash '{prev_hash}', got '{}'",
                entry.prev_hash
            );
        }
        if entry.seq != count {
            bail!("ledger sequence broken at entry {count}: found seq {}", entry.seq);
        }
        prev_hash = line_hash(line);
        count += 1;
    }
    Ok(count)
}

/// Anchor recording the ledger head at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub ledger_file: String,
    pub entries: u64,
    pub chain_head: String,
    pub created_at: DateTime<Utc>,
}

/// Verify the ledger, then write a checkpoint of its current head.
pub fn create_checkpoint(ledger: &Path, checkpoint: &Path) -> Result<Checkpoint> {
    let entries = verify_chain(ledger)?;
    let content = std::fs::read_to_string(ledger)
        .with_context(|| format!("cannot read ledger {}", ledger.display()))?;
    let chain_head = non_empty_lines(&content)
        .last()
        .map(|(_, line)| line_hash(line))
        .unwrap_or_else(|| GENESIS.to_string());

    let cp = Checkpoint {
        ledger_file: ledger.display().to_string(),
        entries,
        chain_head,
        created_at: Utc::now(),
    };
    let json = serde_json::to_string_pretty(&cp)?;
    std::fs::write(checkpoint, json)
        .with_context(|| format!("cannot write checkpoint {}", checkpoint.display()))?;
    Ok(cp)
}

/// Check that the ledger still starts with the checkpointed prefix.
///
/// Entries appended after the checkpoint are allowed.
pub fn verify_checkpoint(ledger: &Path, checkpoint: &Path) -> Result<bool> {
    let cp_content = std::fs::read_to_string(checkpoint)
        .with_context(|| format!("cannot read checkpoint {}", checkpoint.display()))?;
    let cp: Checkpoint = serde_json::from_str(&cp_content)
        .with_context(|| format!("{}: invalid checkpoint", checkpoint.display()))?;

    let content = std::fs::read_to_string(ledger)
        .with_context(|| format!("cannot read ledger {}", ledger.display()))?;

    let mut count = 0u64;
    let mut prev_hash = GENESIS.to_string();
    for (i, line) in non_empty_lines(&content) {
        if count >= cp.entries {
            break;
        }
        let entry: LedgerEntry = serde_json::from_str(line)
            .with_context(|| format!("invalid entry at line {}", i + 1))?;
        if entry.prev_hash != prev_hash {
            return Ok(false);
        }
        prev_hash = line_hash(line);
        count += 1;
    }

    Ok(count == cp.entries && prev_hash == cp.chain_head)
}
