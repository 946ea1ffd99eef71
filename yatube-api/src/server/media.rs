use rand::{Rng, distr::Alphanumeric};
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};
use yatube_common::model::post::POST_IMAGE_DIR;

const RANDOM_SUFFIX_LEN: usize = 7;
const MAX_NAME_ATTEMPTS: usize = 10;

/// Uploaded files on local disk, served under `/media/`.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a post image and returns its path relative to the media root.
    ///
    /// An existing file is never overwritten; the new one gets a random suffix instead.
    pub async fn save_post_image(&self, file_name: &str, data: &[u8]) -> std::io::Result<String> {
        let directory = self.root.join(POST_IMAGE_DIR);
        fs::create_dir_all(&directory).await?;

        let file_name = sanitize_file_name(file_name);
        let mut candidate = file_name.clone();

        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = directory.join(&candidate);
            let open_result = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;

            match open_result {
                Ok(mut file) => {
                    let written = async {
                        file.write_all(data).await?;
                        file.flush().await
                    }
                    .await;

                    if let Err(err) = written {
                        drop(file);
                        if let Err(remove_err) = fs::remove_file(&path).await {
                            warn!(
                                path = %path.display(),
                                %remove_err,
                                "Could not remove partial upload"
                            );
                        }
                        return Err(err);
                    }

                    let stored = format!("{POST_IMAGE_DIR}/{candidate}");
                    info!(path = %stored, bytes = data.len(), "Stored post image");
                    return Ok(stored);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                    candidate = with_random_suffix(&file_name);
                }
                Err(err) => return Err(err),
            }
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free file name for {file_name}"),
        ))
    }

    /// Deletes a stored file given its path relative to the media root.
    ///
    /// Only plain names under the post image directory are accepted.
    pub async fn remove(&self, stored: &str) -> std::io::Result<()> {
        let file_name = stored
            .strip_prefix(POST_IMAGE_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|file_name| sanitize_file_name(file_name) == *file_name)
            .ok_or_else(|| {
                std::io::Error::new(
                    ErrorKind::InvalidInput,
                    format!("not a stored post image: {stored}"),
                )
            })?;

        fs::remove_file(self.root.join(POST_IMAGE_DIR).join(file_name)).await?;
        info!(path = %stored, "Removed post image");
        Ok(())
    }
}

/// Reduces a client-supplied name to a plain file name.
fn sanitize_file_name(file_name: &str) -> String {
    let base_name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();

    let cleaned: String = base_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_owned()
    } else {
        cleaned.to_owned()
    }
}

fn with_random_suffix(file_name: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();

    match file_name.rsplit_once('.') {
        Some((stem, extension)) if !stem.is_empty() => format!("{stem}_{suffix}.{extension}"),
        _ => format!("{file_name}_{suffix}"),
    }
}
