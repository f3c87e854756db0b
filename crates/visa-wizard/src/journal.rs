use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use visa_spec::{AnswerPersister, PersistEntry, PersistError};

/// Appends every persisted answer as one JSON line.
pub struct JsonlPersister {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlPersister {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AnswerPersister for JsonlPersister {
    async fn persist(&self, entry: PersistEntry) -> Result<(), PersistError> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[tokio::test]
    async fn appends_one_line_per_entry() {
        let dir = TempDir::new().expect("temp dir");
        let persister = JsonlPersister::new(dir.path().join("answers.jsonl"));

        for (field, value) in [("purpose", json!("tourism")), ("nights", json!(4))] {
            persister
                .persist(PersistEntry {
                    field_id: field.into(),
                    label: field.into(),
                    value,
                })
                .await
                .expect("persisted");
        }

        let contents = std::fs::read_to_string(persister.path()).expect("journal readable");
        let lines: Vec<Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["fieldId"], "purpose");
        assert_eq!(lines[1]["value"], 4);
    }

    #[tokio::test]
    async fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().expect("temp dir");
        let persister = JsonlPersister::new(dir.path().join("missing").join("answers.jsonl"));
        let result = persister
            .persist(PersistEntry {
                field_id: "purpose".into(),
                label: "Purpose".into(),
                value: json!("tourism"),
            })
            .await;
        assert!(matches!(result, Err(PersistError::Io(_))));
    }
}
