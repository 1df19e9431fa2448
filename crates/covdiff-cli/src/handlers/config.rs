//! Config command handler

use crate::commands::ConfigArgs;
use crate::error::CliResult;
use crate::output::render_config;
use covdiff::AgentConfig;

/// Execute the config command
///
/// Resolves the agent configuration exactly as the agent would at startup,
/// so invalid values surface here as configuration errors.
pub fn execute_config(args: &ConfigArgs) -> CliResult<()> {
    let config = AgentConfig::from_env()?;
    print!("{}", ensure_trailing_newline(render_config(&config, args.format)?));
    Ok(())
}

fn ensure_trailing_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_trailing_newline() {
        assert_eq!(ensure_trailing_newline("a".to_string()), "a\n");
        assert_eq!(ensure_trailing_newline("a\n".to_string()), "a\n");
    }
}
