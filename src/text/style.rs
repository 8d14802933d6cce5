//! Style overrides layered on top of a chunk's base style.

use crate::buffer::{Modifiers, Rgba, Style};

/// A partial style: colors replace when set, modifiers are added.
///
/// Highlight spans, inline marks and the selection are all expressed as
/// overrides and applied in that order on top of the chunk style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StyleOverride {
    /// Replacement foreground.
    pub fg: Option<Rgba>,
    /// Replacement background.
    pub bg: Option<Rgba>,
    /// Modifiers to add.
    pub modifiers: Modifiers,
}

impl StyleOverride {
    /// Override that only changes the foreground.
    #[inline]
    pub fn fg(fg: impl Into<Rgba>) -> Self {
        Self {
            fg: Some(fg.into()),
            ..Self::default()
        }
    }

    /// Override that only adds modifiers.
    #[inline]
    pub const fn modifiers(modifiers: Modifiers) -> Self {
        Self {
            fg: None,
            bg: None,
            modifiers,
        }
    }

    /// Also replace the background (builder pattern).
    #[inline]
    #[must_use]
    pub fn with_bg(mut self, bg: impl Into<Rgba>) -> Self {
        self.bg = Some(bg.into());
        self
    }

    /// Also add modifiers (builder pattern).
    #[inline]
    #[must_use]
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// Apply on top of `style`.
    #[inline]
    pub fn apply(&self, style: Style) -> Style {
        Style {
            fg: self.fg.unwrap_or(style.fg),
            bg: self.bg.unwrap_or(style.bg),
            modifiers: style.modifiers | self.modifiers,
        }
    }
}
