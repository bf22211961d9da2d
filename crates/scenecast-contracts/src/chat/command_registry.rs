#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const UPLOAD_COMMANDS: &[&str] = &["char1", "char2", "char3", "char4", "bg"];

pub(crate) const SLOT_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "remove",
        action: "remove",
    },
    CommandSpec {
        command: "include",
        action: "include",
    },
    CommandSpec {
        command: "exclude",
        action: "exclude",
    },
];

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "generate",
        action: "generate",
    },
    CommandSpec {
        command: "status",
        action: "status",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const ASPECT_COMMAND: &str = "aspect";
pub(crate) const PROMPT_COMMAND: &str = "prompt";

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/char1 <path>",
    "/char2 <path>",
    "/char3 <path>",
    "/char4 <path>",
    "/bg <path>",
    "/remove <slot>",
    "/include <slot>",
    "/exclude <slot>",
    "/aspect <1:1|16:9|9:16|4:3|3:4>",
    "/prompt <text>",
    "/generate",
    "/status",
    "/help",
    "/quit",
];
