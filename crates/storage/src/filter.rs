//! Pluggable per-record compaction filters
//!
//! A column family may register a [`CompactionFilterFactory`]. Every
//! compaction pass over that family asks the factory for a fresh
//! [`CompactionFilter`] and consults it once per surviving record.
//!
//! Filters run with no storage locks held, so they may read back into the
//! store they are compacting.

/// Verdict for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Leave the record in place.
    Keep,
    /// Physically remove the record.
    Remove,
}

/// What a factory knows about the pass it is creating a filter for.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Column family name
    pub family: &'a str,
    /// Column family id
    pub family_id: u32,
    /// True for passes requested through `compact_range`
    pub manual: bool,
}

/// Per-pass record filter.
pub trait CompactionFilter: Send {
    /// Decide the fate of one record.
    fn filter(&mut self, key: &[u8], value: &[u8]) -> Decision;

    /// Name used in logs.
    fn name(&self) -> &str;
}

/// Creates filters for compaction passes over one column family.
pub trait CompactionFilterFactory: Send + Sync {
    /// Build a filter for this pass.
    ///
    /// Returning `None` skips filtering for the pass, e.g. when the owner of
    /// the family is not fully initialized yet.
    fn create(&self, ctx: &FilterContext<'_>) -> Option<Box<dyn CompactionFilter>>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
