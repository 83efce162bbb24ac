//! Exercise command vocabulary.

use crate::model::BlockKind;

/// Metadata field a command fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    Id,
    Title,
    Chapter,
    Subchapter,
    Theme,
    Author,
    Organization,
    VideoId,
    CreatedAt,
    Difficulty,
}

/// What a recognized command contributes to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRole {
    Meta(MetaField),
    /// Content block; `verbatim` blocks keep their comments.
    Content { kind: BlockKind, verbatim: bool },
}

/// Command name to role, in the order commands are documented.
pub const COMMANDS: &[(&str, CommandRole)] = &[
    ("uuid", CommandRole::Meta(MetaField::Id)),
    ("titre", CommandRole::Meta(MetaField::Title)),
    ("chapitre", CommandRole::Meta(MetaField::Chapter)),
    ("sousChapitre", CommandRole::Meta(MetaField::Subchapter)),
    ("theme", CommandRole::Meta(MetaField::Theme)),
    ("auteur", CommandRole::Meta(MetaField::Author)),
    ("organisation", CommandRole::Meta(MetaField::Organization)),
    ("video", CommandRole::Meta(MetaField::VideoId)),
    ("datecreate", CommandRole::Meta(MetaField::CreatedAt)),
    ("niveau", CommandRole::Meta(MetaField::Difficulty)),
    (
        "texte",
        CommandRole::Content {
            kind: BlockKind::Text,
            verbatim: false,
        },
    ),
    (
        "question",
        CommandRole::Content {
            kind: BlockKind::Question,
            verbatim: false,
        },
    ),
    (
        "indication",
        CommandRole::Content {
            kind: BlockKind::Hint,
            verbatim: false,
        },
    ),
    (
        "reponse",
        CommandRole::Content {
            kind: BlockKind::Answer,
            verbatim: false,
        },
    ),
    (
        "code",
        CommandRole::Content {
            kind: BlockKind::Code,
            verbatim: true,
        },
    ),
];

/// Role of command `name`, if part of the vocabulary.
#[must_use]
pub fn role_of(name: &str) -> Option<CommandRole> {
    COMMANDS
        .iter()
        .find(|(command, _)| *command == name)
        .map(|&(_, role)| role)
}

/// Every command name.
pub fn command_names() -> impl Iterator<Item = &'static str> {
    COMMANDS.iter().map(|&(name, _)| name)
}
