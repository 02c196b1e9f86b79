//! Request-path to pattern matching.
//!
//! Patterns are tried in registration order and the first one whose segment
//! scan completes wins, so an earlier broad pattern shadows a later specific
//! one.

use super::pattern::{Pattern, Segment};
use super::registry::{Module, Registry};

/// Finds the module owning `segments` (by its first component) and the
/// first of its patterns that matches the rest.
pub fn lookup<'a>(registry: &'a Registry, segments: &[String]) -> Option<(&'a Module, &'a Pattern)> {
    let prefix = segments.first()?;
    let module = registry.find(prefix)?;
    let pattern = find_pattern(module, segments)?;
    Some((module, pattern))
}

/// First pattern of `module` matching `segments`; `segments[0]` is the module prefix.
pub fn find_pattern<'a>(module: &'a Module, segments: &[String]) -> Option<&'a Pattern> {
    // A bare module prefix never matches.
    let rest = segments.get(1..).filter(|rest| !rest.is_empty())?;
    module.patterns().iter().find(|p| unifies(p, rest))
}

fn unifies(pattern: &Pattern, path: &[String]) -> bool {
    if path.len() < pattern.required_depth() {
        return false;
    }
    for (segment, component) in pattern.segments().iter().zip(path) {
        match segment {
            Segment::CatchAll => return true,
            Segment::SingleWildcard => continue,
            Segment::Literal(text) => {
                if text != component {
                    return false;
                }
            }
        }
    }
    // Either every segment was compared or only a trailing `#` was left,
    // which also matches an empty remainder.
    true
}
