//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Ord + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> Self::Id;

    /// Display name used for ordering listings (ascending, case-sensitive).
    fn sort_name(&self) -> &str;
}

/// Sort entities by name ascending, using the identifier as tie-breaker so the
/// order is total and deterministic.
pub fn sort_by_name<E: Entity>(items: &mut [E]) {
    items.sort_by(|a, b| {
        a.sort_name()
            .cmp(b.sort_name())
            .then_with(|| a.id().cmp(&b.id()))
    });
}
