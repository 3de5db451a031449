//! Command definitions
//!
//! Parses lines from the interactive prompt.
//!
//! ```text
//! put <file_path>
//! get <file_id> [output_path]
//! delete <file_id>
//! list
//! exit
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, StoreError};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store a file from disk
    Put { path: PathBuf },

    /// Reconstruct a file; written to `output`, or to its stored name
    Get { id: u64, output: Option<PathBuf> },

    /// Remove a file and its parts
    Delete { id: u64 },

    /// Show all files
    List,

    /// Stop the prompt
    Exit,
}

impl Command {
    /// Parse one prompt line
    pub fn parse(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = words.split_first() else {
            return Err(StoreError::Command("Empty command".to_string()));
        };

        match (name, args) {
            ("put", [path]) => Ok(Command::Put {
                path: PathBuf::from(path),
            }),
            ("put", _) => Err(usage("put <file_path>")),

            ("get", [id]) => Ok(Command::Get {
                id: parse_id(id)?,
                output: None,
            }),
            ("get", [id, output]) => Ok(Command::Get {
                id: parse_id(id)?,
                output: Some(PathBuf::from(output)),
            }),
            ("get", _) => Err(usage("get <file_id> [output_path]")),

            ("delete", [id]) => Ok(Command::Delete { id: parse_id(id)? }),
            ("delete", _) => Err(usage("delete <file_id>")),

            ("list", []) => Ok(Command::List),
            ("list", _) => Err(usage("list")),

            ("exit", []) => Ok(Command::Exit),
            ("exit", _) => Err(usage("exit")),

            (other, _) => Err(StoreError::Command(format!("Unknown command: {}", other))),
        }
    }
}

impl FromStr for Command {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Command::parse(s)
    }
}

fn parse_id(raw: &str) -> Result<u64> {
    raw.parse()
        .map_err(|_| StoreError::Command(format!("Invalid file id: {}", raw)))
}

fn usage(form: &str) -> StoreError {
    StoreError::Command(format!("Wrong arguments, usage: {}", form))
}
