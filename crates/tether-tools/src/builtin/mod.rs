// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod bash;
mod edit;
mod read;
mod search_web;
mod write;

pub use bash::BashTool;
pub use edit::EditTool;
pub use read::ReadTool;
pub use search_web::SearchWebTool;
pub use write::WriteTool;

use crate::ToolRegistry;

/// Registry with the full built-in toolset under default settings.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(BashTool::default());
    registry.register(ReadTool);
    registry.register(WriteTool);
    registry.register(EditTool);
    registry.register(SearchWebTool);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_builtins() {
        let reg = default_registry();
        assert_eq!(
            reg.names(),
            vec!["bash", "edit", "read", "search_web", "write"]
        );
    }
}
