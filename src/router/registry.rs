//! Fixed-capacity module table and per-module pattern tables.

use crate::error::{RestError, RestResult};
use crate::http::Method;

use super::Handler;
use super::pattern::{MAX_SEGMENT_LEN, Pattern};

/// Maximum number of modules registered at once.
pub const MAX_MODULES: usize = 5;

/// Maximum number of patterns per module.
pub const MAX_PATTERNS: usize = 100;

/// Stable reference to a registered module.
///
/// The generation makes a handle stale once its module is unregistered, even
/// if a later module reuses the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleHandle {
    index: usize,
    generation: u64,
}

impl ModuleHandle {
    /// Slot index in the module table.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// A namespace of patterns sharing one path prefix.
#[derive(Debug)]
pub struct Module {
    prefix: String,
    patterns: Vec<Pattern>,
}

impl Module {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Patterns in registration order.
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Installs `handler` for (`raw_uri`, `method`).
    ///
    /// A pattern equal to an existing one (same compiled segments) is reused;
    /// otherwise a new pattern is appended. Returns `true` if a handler was
    /// replaced.
    pub(crate) fn add_handler(
        &mut self,
        raw_uri: &str,
        method: &Method,
        handler: Handler,
    ) -> RestResult<bool> {
        if !method.is_routable() {
            return Err(RestError::invalid(format!("unsupported method {method}")));
        }

        let compiled = Pattern::compile(&self.prefix, raw_uri)?;
        if let Some(existing) = self
            .patterns
            .iter_mut()
            .find(|p| p.segments() == compiled.segments())
        {
            return Ok(existing.set_handler(method, handler)?.is_some());
        }

        if self.patterns.len() >= MAX_PATTERNS {
            return Err(RestError::CapacityExceeded("patterns per module"));
        }
        self.patterns.try_reserve(1)?;

        let mut pattern = compiled;
        pattern.set_handler(method, handler)?;
        self.patterns.push(pattern);
        Ok(false)
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u64,
    module: Option<Module>,
}

/// The module table.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Slot>,
    next_generation: u64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            slots: (0..MAX_MODULES).map(|_| Slot::default()).collect(),
            next_generation: 1,
        }
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.module.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register(&mut self, prefix: &str) -> RestResult<ModuleHandle> {
        validate_prefix(prefix)?;
        if self.find(prefix).is_some() {
            return Err(RestError::invalid(format!(
                "module prefix {prefix:?} already registered"
            )));
        }

        let index = self
            .slots
            .iter()
            .position(|s| s.module.is_none())
            .ok_or(RestError::CapacityExceeded("modules"))?;

        let generation = self.next_generation;
        self.next_generation += 1;

        let slot = &mut self.slots[index];
        slot.generation = generation;
        slot.module = Some(Module {
            prefix: prefix.to_owned(),
            patterns: Vec::new(),
        });

        Ok(ModuleHandle { index, generation })
    }

    pub(crate) fn unregister(&mut self, handle: ModuleHandle) -> RestResult<Module> {
        self.slot_mut(handle)?;
        self.slots[handle.index]
            .module
            .take()
            .ok_or_else(|| RestError::invalid("stale module handle"))
    }

    pub fn module(&self, handle: ModuleHandle) -> RestResult<&Module> {
        self.slots
            .get(handle.index)
            .filter(|s| s.generation == handle.generation)
            .and_then(|s| s.module.as_ref())
            .ok_or_else(|| RestError::invalid("stale module handle"))
    }

    pub(crate) fn module_mut(&mut self, handle: ModuleHandle) -> RestResult<&mut Module> {
        self.slot_mut(handle)?
            .module
            .as_mut()
            .ok_or_else(|| RestError::invalid("stale module handle"))
    }

    fn slot_mut(&mut self, handle: ModuleHandle) -> RestResult<&mut Slot> {
        self.slots
            .get_mut(handle.index)
            .filter(|s| s.generation == handle.generation && s.module.is_some())
            .ok_or_else(|| RestError::invalid("stale module handle"))
    }

    /// The module whose prefix equals `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&Module> {
        self.slots
            .iter()
            .filter_map(|s| s.module.as_ref())
            .find(|m| m.prefix == prefix)
    }
}

fn validate_prefix(prefix: &str) -> RestResult<()> {
    if prefix.is_empty() {
        return Err(RestError::invalid("empty module prefix"));
    }
    if prefix.contains(['/', '?']) {
        return Err(RestError::invalid(format!(
            "module prefix {prefix:?} must be a single path component"
        )));
    }
    if prefix.len() > MAX_SEGMENT_LEN {
        return Err(RestError::invalid("module prefix too long"));
    }
    Ok(())
}
