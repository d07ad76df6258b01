/// Local store for preferences and error logs
pub const STORE_DIR: &str = "./.answerline";

pub const PREFERENCES_FILE: &str = "preferences.yaml";

pub const ERRORS_DIR: &str = "errors";

/// Config file looked up in the working directory unless ANSWERLINE_CONFIG is set
pub const CONFIG_FILE: &str = "answerline.yaml";

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3000";

/// Size of each read from the response body
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Timeout for non-streaming requests (suggestions, chat hydration)
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Longer first messages are cut to this many chars plus an ellipsis
pub const TITLE_MAX_CHARS: usize = 25;
