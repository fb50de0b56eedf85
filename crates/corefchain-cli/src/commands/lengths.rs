//! Lengths command implementation.

use crate::cli::LengthsArgs;
use crate::error::{CliError, Result};
use crate::output::{FileLength, Formatter};
use std::fs;
use std::path::Path;

/// Execute the lengths command.
pub fn execute_lengths(args: LengthsArgs, formatter: &Formatter) -> Result<()> {
    let lengths = text_lengths(&args.dir)?;
    println!("{}", formatter.format_lengths(&lengths)?);
    Ok(())
}

/// Character length of every `.txt` file directly inside `dir`, by name.
pub fn text_lengths(dir: &Path) -> Result<Vec<FileLength>> {
    if !dir.is_dir() {
        return Err(CliError::InvalidInput(format!(
            "{} is not a directory",
            dir.display()
        )));
    }

    let mut lengths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        let text = fs::read_to_string(&path)?;
        lengths.push(FileLength {
            file: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            chars: text.chars().count(),
        });
    }
    lengths.sort_by(|a, b| a.file.cmp(&b.file));
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_counts_characters_of_txt_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("b.txt"), "Mária").unwrap();
        fs::write(temp.path().join("a.txt"), "Maria crossed").unwrap();
        fs::write(temp.path().join("notes.md"), "ignored").unwrap();
        fs::create_dir(temp.path().join("sub.txt")).unwrap();

        let lengths = text_lengths(temp.path()).unwrap();
        assert_eq!(
            lengths,
            vec![
                FileLength {
                    file: "a.txt".to_string(),
                    chars: 13,
                },
                FileLength {
                    file: "b.txt".to_string(),
                    chars: 5,
                },
            ]
        );
    }

    #[test]
    fn test_rejects_missing_directory() {
        let temp = TempDir::new().unwrap();
        let result = text_lengths(&temp.path().join("absent"));
        assert!(matches!(result, Err(CliError::InvalidInput(_))));
    }
}
