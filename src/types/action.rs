//! SyncAction - Actions determined by the diff engine

/// What a single remote file needs after comparing a listing to the state table
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    /// File is not tracked yet → download
    Download {
        name: String,
        size: Option<u64>,
        exists: bool,
    },

    /// File is tracked but size/existence changed → download again
    Redownload {
        name: String,
        size: Option<u64>,
        exists: bool,
    },

    /// File is tracked but vanished from the listing → delete local mirror
    DeleteLocal(String),

    /// Nothing changed
    Skip,
}

impl SyncAction {
    /// Check if this action is a skip
    pub fn is_skip(&self) -> bool {
        matches!(self, SyncAction::Skip)
    }

    /// Check if this action transfers a file
    pub fn is_download(&self) -> bool {
        matches!(
            self,
            SyncAction::Download { .. } | SyncAction::Redownload { .. }
        )
    }

    /// Filename the action applies to
    pub fn name(&self) -> Option<&str> {
        match self {
            SyncAction::Download { name, .. }
            | SyncAction::Redownload { name, .. }
            | SyncAction::DeleteLocal(name) => Some(name),
            SyncAction::Skip => None,
        }
    }

    /// Short label used in log lines
    pub fn action_name(&self) -> &'static str {
        match self {
            SyncAction::Download { .. } => "NEW FILE",
            SyncAction::Redownload { .. } => "FILE CHANGED",
            SyncAction::DeleteLocal(_) => "FILE REMOVED",
            SyncAction::Skip => "SKIP",
        }
    }
}

/// Which side is authoritative for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    /// Poll the server and download changes
    #[default]
    RemoteToLocal,

    /// Watch the local folder and upload changes
    LocalToRemote,
}

/// Remote protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Sftp,
    Ftp,
}

impl TransportKind {
    /// Well-known port for the protocol
    pub fn default_port(self) -> u16 {
        match self {
            TransportKind::Sftp => 22,
            TransportKind::Ftp => 21,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TransportKind::Sftp => "SFTP",
            TransportKind::Ftp => "FTP",
        }
    }
}
