//! Remote folder browsing command

use crate::config::{normalize_remote, BrowseArgs};
use crate::transport::{self, remote_join, Transport};
use crate::types::SyncError;
use console::style;

/// Connect and print the folders of a remote directory
pub async fn run(args: BrowseArgs) -> Result<(), SyncError> {
    let file = args.connection.file_config()?;
    let endpoint = args.connection.resolve(&file)?;
    let path = normalize_remote(&args.path);

    let transport = transport::create(&endpoint);
    transport
        .connect()
        .await
        .map_err(|err| SyncError::Connection(err.to_string()))?;
    let result = list_folders(transport.as_ref(), &path).await;
    transport.disconnect().await;

    println!("{}", format_listing(&path, &result?));
    Ok(())
}

/// Sorted folder names under `path`
pub async fn list_folders(transport: &dyn Transport, path: &str) -> Result<Vec<String>, SyncError> {
    let mut folders = transport
        .list_subdirectories(path)
        .await
        .map_err(|source| SyncError::Listing {
            path: path.to_string(),
            source,
        })?;
    folders.sort();
    Ok(folders)
}

fn format_listing(path: &str, folders: &[String]) -> String {
    let mut lines = vec![style(path).bold().to_string()];
    if folders.is_empty() {
        lines.push("  (no folders)".to_string());
    }
    for folder in folders {
        lines.push(format!("  {}/", remote_join(path, folder)));
    }
    lines.join("\n")
}
