//! Rendering of query templates with named, typed parameters.

pub(crate) mod escape;
mod params;
mod render;

pub(crate) use params::render_query;

/// Binds the given string as an identifier rather than a literal; useful
/// for table or database names that come from a variable.
#[derive(Copy, Clone)]
pub struct Identifier<'a>(pub &'a str);

impl std::fmt::Display for Identifier<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        escape::identifier(self.0, f)
    }
}
