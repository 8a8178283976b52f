//! Positional placeholder styles.

/// How bound parameters are written into rendered SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaceholderStyle {
    /// `?` for every parameter (MySQL, SQLite).
    #[default]
    Question,
    /// `$1`, `$2`, ... numbered by position (PostgreSQL).
    Dollar,
}

impl PlaceholderStyle {
    /// Write the placeholder for the parameter at 1-based `position`.
    pub fn write(self, out: &mut String, position: usize) {
        match self {
            PlaceholderStyle::Question => out.push('?'),
            PlaceholderStyle::Dollar => {
                out.push('$');
                out.push_str(&position.to_string());
            }
        }
    }
}
