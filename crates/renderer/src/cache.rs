use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::compile::{wrap_fragment, CompiledProgram};
use crate::context::GraphicsContext;
use crate::types::ContextId;

/// 32-bit rolling hash over UTF-16 code units (`h = h * 31 + c`, wrapping).
///
/// Not collision resistant. Distinct sources that collide share a cached
/// program.
pub fn source_hash(source: &str) -> i32 {
    source.encode_utf16().fold(0i32, |hash, unit| {
        hash.wrapping_shl(5)
            .wrapping_sub(hash)
            .wrapping_add(i32::from(unit))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub context: ContextId,
    pub hash: i32,
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:08x}", self.context, self.hash)
    }
}

/// Cache handle shared by every canvas in a process.
pub type SharedProgramCache<D> = Rc<RefCell<ProgramCache<D>>>;

/// Content-addressed store of linked programs.
///
/// Entries are never evicted, so a cached program is never deleted by its
/// consumers.
pub struct ProgramCache<D> {
    entries: HashMap<CacheKey, Rc<CompiledProgram<D>>>,
}

impl<D> ProgramCache<D> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn shared() -> SharedProgramCache<D> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Key for a vertex/fragment pair; the fragment is hashed in its wrapped
    /// form.
    pub fn key(
        context: &GraphicsContext<D>,
        vertex_source: &str,
        fragment_source: &str,
    ) -> CacheKey {
        let mut combined = String::with_capacity(vertex_source.len() + fragment_source.len() * 2);
        combined.push_str(vertex_source);
        combined.push_str(&wrap_fragment(fragment_source));
        CacheKey {
            context: context.id(),
            hash: source_hash(&combined),
        }
    }

    /// Returns the entry for `key` only when it was linked on `context`
    /// itself. A matching id on a different device is a miss.
    pub fn lookup(
        &self,
        key: &CacheKey,
        context: &GraphicsContext<D>,
    ) -> Option<Rc<CompiledProgram<D>>> {
        let entry = self.entries.get(key)?;
        if !entry.belongs_to(context) {
            tracing::debug!(%key, "cache entry belongs to another context");
            return None;
        }
        tracing::debug!(%key, "program cache hit");
        Some(Rc::clone(entry))
    }

    /// Stores `program` under `key`, replacing any previous entry.
    pub fn insert(&mut self, key: CacheKey, program: Rc<CompiledProgram<D>>) {
        if self.entries.insert(key, program).is_some() {
            tracing::debug!(%key, "program cache entry replaced");
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<D> Default for ProgramCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D> fmt::Debug for ProgramCache<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgramCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{compile_program, VERTEX_SHADER};
    use crate::recording::RecordingDevice;

    const SOURCE: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(p, 0.0, 1.0); }";

    #[test]
    fn hash_matches_string_hash_code() {
        assert_eq!(source_hash(""), 0);
        assert_eq!(source_hash("a"), 97);
        assert_eq!(source_hash("ab"), 97 * 31 + 98);
        assert_eq!(source_hash("hello"), 99_162_322);
        // wraps instead of overflowing
        assert_eq!(source_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn hash_counts_utf16_units() {
        assert_eq!(source_hash("é"), 0xe9);
        assert_eq!(source_hash("😀"), 0xd83d * 31 + 0xde00);
    }

    #[test]
    fn key_depends_on_context_and_source() {
        let first = GraphicsContext::new(RecordingDevice::new(64, 64));
        let second = GraphicsContext::new(RecordingDevice::new(64, 64));
        let a = ProgramCache::key(&first, VERTEX_SHADER, SOURCE);
        assert_eq!(a, ProgramCache::key(&first, VERTEX_SHADER, SOURCE));
        assert_ne!(a, ProgramCache::key(&second, VERTEX_SHADER, SOURCE));
        let other = "void mainImage(out vec4 c, in vec2 p) {}";
        assert_ne!(a, ProgramCache::key(&first, VERTEX_SHADER, other));
    }

    #[test]
    fn lookup_returns_the_stored_reference() {
        let context = GraphicsContext::new(RecordingDevice::new(64, 64));
        let mut cache = ProgramCache::new();
        let key = ProgramCache::key(&context, VERTEX_SHADER, SOURCE);
        assert!(cache.lookup(&key, &context).is_none());

        let program = Rc::new(compile_program(&context, VERTEX_SHADER, SOURCE).unwrap());
        cache.insert(key, Rc::clone(&program));
        let hit = cache.lookup(&key, &context).unwrap();
        assert!(Rc::ptr_eq(&hit, &program));
        assert!(cache.contains(&key));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn lookup_rejects_entry_from_another_context() {
        let owner = GraphicsContext::new(RecordingDevice::new(64, 64));
        let other = GraphicsContext::new(RecordingDevice::new(64, 64));
        let mut cache = ProgramCache::new();
        let program = Rc::new(compile_program(&owner, VERTEX_SHADER, SOURCE).unwrap());
        // Store under the other context's key to simulate an id clash.
        let key = ProgramCache::key(&other, VERTEX_SHADER, SOURCE);
        cache.insert(key, program);
        assert!(cache.lookup(&key, &other).is_none());
    }

    #[test]
    fn last_insert_wins() {
        let context = GraphicsContext::new(RecordingDevice::new(64, 64));
        let mut cache = ProgramCache::new();
        let key = ProgramCache::key(&context, VERTEX_SHADER, SOURCE);
        let first = Rc::new(compile_program(&context, VERTEX_SHADER, SOURCE).unwrap());
        let second = Rc::new(compile_program(&context, VERTEX_SHADER, SOURCE).unwrap());
        cache.insert(key, first);
        cache.insert(key, Rc::clone(&second));
        assert_eq!(cache.len(), 1);
        assert!(Rc::ptr_eq(&cache.lookup(&key, &context).unwrap(), &second));
    }
}
