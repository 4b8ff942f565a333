/// Instruction sent as the system turn of every completion request.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Shown in place of a bot reply when the completion round-trip fails.
pub const FALLBACK_REPLY: &str = "Error getting response. Try again!";

/// Composer placeholder
pub const INPUT_PLACEHOLDER: &str = "Ask me anything...";

/// Welcome text shown before the first message is sent
pub const WELCOME_HEADING: &str = "Hi";
pub const WELCOME_SUBHEADING: &str = "use chat to get started";

/// Busy indicator shown while a reply is outstanding
pub const ANALYZING: &str = "Analyzing";
