use std::fmt;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for the dagger-live engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// The graph could not be translated into source programs
    #[error("Code generation failed: {message}")]
    Generation {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A source program failed to produce an executable artifact
    #[error("Compilation failed for program {index}: {message}")]
    Compilation {
        index: usize,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// A compiled artifact failed while running
    #[error("Program {index} failed at run time: {message}")]
    Runtime {
        index: usize,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Invalid node graph definition or edit
    #[error("Invalid graph: {message}")]
    Graph { message: String },

    /// Serialization errors
    #[error("Serialization failed: {format}")]
    Serialization {
        format: String,
        #[source]
        source: BoxError,
    },

    /// IO errors
    #[error("IO operation failed: {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

/// Wraps an `anyhow::Error` so it can travel as a `#[source]`
#[derive(Debug)]
struct Cause(anyhow::Error);

impl fmt::Display for Cause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl std::error::Error for Cause {}

impl EngineError {
    /// Create a generation error from a collaborator failure
    pub fn generation(err: anyhow::Error) -> Self {
        Self::Generation {
            message: format!("{:#}", err),
            source: Some(Box::new(Cause(err))),
        }
    }

    /// Create a compilation error for the program at `index`
    pub fn compilation(index: usize, err: anyhow::Error) -> Self {
        Self::Compilation {
            index,
            message: format!("{:#}", err),
            source: Some(Box::new(Cause(err))),
        }
    }

    /// Create a runtime error for the artifact at `index`
    pub fn runtime(index: usize, err: anyhow::Error) -> Self {
        Self::Runtime {
            index,
            message: format!("{:#}", err),
            source: Some(Box::new(Cause(err))),
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
            field: None,
        }
    }

    /// Create a configuration error pointing at a field
    pub fn configuration_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Configuration {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a graph error
    pub fn graph<S: Into<String>>(message: S) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
        format: S,
        source: E,
    ) -> Self {
        Self::Serialization {
            format: format.into(),
            source: Box::new(source),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(operation: S, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// Whether `request_update` always keeps this failure to itself
    pub fn is_contained(&self) -> bool {
        matches!(self, Self::Generation { .. } | Self::Compilation { .. })
    }

    /// Get error category for diagnostics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Generation { .. } => "generation",
            Self::Compilation { .. } => "compilation",
            Self::Runtime { .. } => "runtime",
            Self::Configuration { .. } => "configuration",
            Self::Graph { .. } => "graph",
            Self::Serialization { .. } => "serialization",
            Self::Io { .. } => "io",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("json", err)
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization("yaml", err)
    }
}
