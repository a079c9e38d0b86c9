pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const FUNCTIONS_DIR_NAME: &str = "functions";
pub const BINARY_NAME: &str = env!("CARGO_BIN_NAME");
