// SPDX-License-Identifier: AGPL-3.0-or-later

/// Strategy governing how an AST serialises to text.
///
/// Layouts compose: each nesting level of the AST asks its layout for the
/// strategy of the next level via [`Layout::nested`]. The multiline layout
/// deepens its indentation one step at a time, the inline layout stays
/// inline all the way down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// One selection per line, indented with `depth` repetitions of `tab`.
    Multiline { tab: String, depth: usize },

    /// Everything on one line, separated by single spaces.
    Inline,
}

impl Layout {
    /// Multiline layout starting at depth zero with the given indent
    /// string.
    pub fn multiline(tab: &str) -> Self {
        Layout::Multiline {
            tab: tab.to_owned(),
            depth: 0,
        }
    }

    pub fn inline() -> Self {
        Layout::Inline
    }

    /// The strategy for the next nesting level.
    pub(crate) fn nested(&self) -> Layout {
        match self {
            Layout::Multiline { tab, depth } => Layout::Multiline {
                tab: tab.clone(),
                depth: depth + 1,
            },
            Layout::Inline => Layout::Inline,
        }
    }

    /// Prefix written before each item at this level.
    pub(crate) fn prefix(&self) -> String {
        match self {
            Layout::Multiline { tab, depth } => tab.repeat(*depth),
            Layout::Inline => String::new(),
        }
    }

    /// Separator written between sibling items at this level.
    pub(crate) fn separator(&self) -> &str {
        match self {
            Layout::Multiline { .. } => "\n",
            Layout::Inline => " ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiline_deepens_one_step_at_a_time() {
        let layout = Layout::multiline("  ");
        assert_eq!(layout.prefix(), "");
        assert_eq!(layout.nested().prefix(), "  ");
        assert_eq!(layout.nested().nested().prefix(), "    ");
    }

    #[test]
    fn inline_stays_inline() {
        let layout = Layout::inline();
        assert_eq!(layout.nested(), Layout::Inline);
        assert_eq!(layout.prefix(), "");
        assert_eq!(layout.separator(), " ");
    }
}
