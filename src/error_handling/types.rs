use std::fmt;
use std::time::Duration;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    MissingBucket,
    MissingPublicUrl,
    EmptyCommand(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::MissingBucket => write!(f, "Storage bucket identifier is missing"),
            ConfigError::MissingPublicUrl => {
                write!(f, "Public artifact visibility requires `public_base_url`")
            }
            ConfigError::EmptyCommand(e) => write!(f, "Camera command error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failures raised by the capture provider.
#[derive(Debug)]
pub enum DeviceError {
    NotConnected(String),
    Busy(String),
    CaptureFailed(String),
    EmptyFrame,
    Timeout(Duration),
    IoError(std::io::Error),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotConnected(e) => write!(f, "Camera not connected: {}", e),
            DeviceError::Busy(e) => write!(f, "Camera busy: {}", e),
            DeviceError::CaptureFailed(e) => write!(f, "Capture failed: {}", e),
            DeviceError::EmptyFrame => write!(f, "Camera returned an empty frame"),
            DeviceError::Timeout(limit) => write!(f, "Capture timed out after {:?}", limit),
            DeviceError::IoError(e) => write!(f, "Camera IO error: {}", e),
        }
    }
}

impl std::error::Error for DeviceError {}

impl From<std::io::Error> for DeviceError {
    fn from(err: std::io::Error) -> Self {
        DeviceError::IoError(err)
    }
}

/// Failures raised while pushing an artifact to the artifact store.
#[derive(Debug)]
pub enum TransferError {
    InvalidPath(String),
    WriteFailed(std::io::Error),
    UrlUnresolvable(String),
    Timeout(Duration),
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferError::InvalidPath(e) => write!(f, "Invalid artifact path: {}", e),
            TransferError::WriteFailed(e) => write!(f, "Artifact write failed: {}", e),
            TransferError::UrlUnresolvable(e) => write!(f, "Artifact URL unresolvable: {}", e),
            TransferError::Timeout(limit) => write!(f, "Upload timed out after {:?}", limit),
        }
    }
}

impl std::error::Error for TransferError {}

/// Failures raised by the command channel or the result ledger.
#[derive(Debug)]
pub enum PersistenceError {
    ReadFailed(String),
    WriteFailed(String),
    Malformed(String),
    SubscriptionFailed(String),
    Timeout(Duration),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PersistenceError::ReadFailed(e) => write!(f, "Persistence read failed: {}", e),
            PersistenceError::WriteFailed(e) => write!(f, "Persistence write failed: {}", e),
            PersistenceError::Malformed(e) => write!(f, "Malformed document: {}", e),
            PersistenceError::SubscriptionFailed(e) => write!(f, "Subscription failed: {}", e),
            PersistenceError::Timeout(limit) => write!(f, "Write timed out after {:?}", limit),
        }
    }
}

impl std::error::Error for PersistenceError {}

/// Failures around the local, cycle-owned artifact file.
#[derive(Debug)]
pub enum ArtifactError {
    CreateFailed(std::io::Error),
    ReadFailed(std::io::Error),
}

impl fmt::Display for ArtifactError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactError::CreateFailed(e) => write!(f, "Local artifact creation failed: {}", e),
            ArtifactError::ReadFailed(e) => write!(f, "Local artifact read failed: {}", e),
        }
    }
}

impl std::error::Error for ArtifactError {}

/// Error that terminated a capture cycle, tagged with the failing stage.
#[derive(Debug)]
pub enum CycleError {
    Device(DeviceError),
    Artifact(ArtifactError),
    Transfer(TransferError),
    Record(PersistenceError),
    Acknowledge(PersistenceError),
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Device(e) => write!(f, "Device error: {}", e),
            CycleError::Artifact(e) => write!(f, "Artifact error: {}", e),
            CycleError::Transfer(e) => write!(f, "Transfer error: {}", e),
            CycleError::Record(e) => write!(f, "Result record error: {}", e),
            CycleError::Acknowledge(e) => write!(f, "Acknowledgment error: {}", e),
        }
    }
}

impl std::error::Error for CycleError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    PersistenceError(PersistenceError),
    InitializationFailed(String),
    SupervisionFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::PersistenceError(e) => write!(f, "Persistence error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
            ControllerError::SupervisionFailed(e) => write!(f, "Supervision failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<PersistenceError> for ControllerError {
    fn from(err: PersistenceError) -> Self {
        ControllerError::PersistenceError(err)
    }
}
