//! Striping layouts and the layout catalog.
//!
//! A layout is the striping recipe of a byte container: `unit_size` bytes
//! per stripe unit, `data_units` data + `parity_units` parity +
//! `spare_units` spare units per parity group, spread over a pool
//! `pool_width` targets wide. Writes align to the group size (or the unit
//! size for the final block of an object), and the optimal I/O block size
//! is derived from the layout so that several units aggregate per target
//! into one network round-trip.

use crate::error::{StoreError, StoreResult};

/// Round `x` up to the next multiple of `by`. Zero stays zero.
#[must_use]
pub fn roundup(x: u64, by: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    ((x - 1) / by + 1) * by
}

/// Round `x` down to a multiple of `by`.
#[must_use]
pub fn rounddown(x: u64, by: u64) -> u64 {
    x / by * by
}

/// One striping recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Catalog identifier, persisted in object metadata records.
    pub id: u64,
    /// Bytes per stripe unit.
    pub unit_size: u64,
    /// Data units per parity group (N).
    pub data_units: u64,
    /// Parity units per parity group (K).
    pub parity_units: u64,
    /// Spare units per parity group (S).
    pub spare_units: u64,
    /// Number of targets the pool stripes across (P).
    pub pool_width: u64,
}

impl Layout {
    /// Bytes per parity group: `N * unit_size`.
    #[must_use]
    pub fn group_size(&self) -> u64 {
        self.data_units * self.unit_size
    }

    /// The optimal I/O block size for a transfer of `len` bytes.
    ///
    /// The block is at most `depth` units deep per target, where the
    /// saturation depth is `128 / ceil(unit / 32 KiB)` (at least 1), so
    /// small-unit layouts aggregate many units per target while large-unit
    /// layouts stay within per-target transfer limits. The resulting
    /// maximum block spans the data fraction of the pool width and is a
    /// multiple of the group size.
    ///
    /// If `len` reaches the maximum, the maximum is returned; otherwise the
    /// length is rounded up to the unit size when `last` (the final block
    /// of the object) or to the group size.
    #[must_use]
    pub fn optimal_block_size(&self, len: u64, last: bool) -> u64 {
        let unit = self.unit_size;
        let group = self.group_size();
        let depth = (128 / unit.div_ceil(0x8000)).max(1);
        let total = self.data_units + self.parity_units + self.spare_units;
        let max_bs = depth * unit * self.pool_width * self.data_units / total;
        let max_bs = roundup(max_bs, group);

        if len >= max_bs {
            max_bs
        } else if last {
            roundup(len, unit)
        } else {
            roundup(len, group)
        }
    }
}

/// The set of layouts a store instance offers, queried by object size.
#[derive(Debug, Clone)]
pub struct LayoutCatalog {
    layouts: Vec<Layout>,
}

impl LayoutCatalog {
    /// Build a catalog from explicit layouts, kept sorted by unit size.
    #[must_use]
    pub fn new(mut layouts: Vec<Layout>) -> Self {
        layouts.sort_by_key(|l| l.unit_size);
        Self { layouts }
    }

    /// The catalog used when none is configured: power-of-two unit tiers
    /// over a 4+2 parity group on an 8-wide pool.
    #[must_use]
    pub fn standard() -> Self {
        let tiers = [16 * 1024, 64 * 1024, 256 * 1024, 1024 * 1024];
        let layouts = tiers
            .iter()
            .enumerate()
            .map(|(i, &unit_size)| Layout {
                id: i as u64 + 1,
                unit_size,
                data_units: 4,
                parity_units: 2,
                spare_units: 0,
                pool_width: 8,
            })
            .collect();
        Self::new(layouts)
    }

    /// Pick the layout best matching an object of `size` bytes: the
    /// largest unit tier whose parity group still fits the object, falling
    /// back to the smallest tier for small objects.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoLayout`] when the catalog is empty.
    pub fn find_by_objsize(&self, size: u64) -> StoreResult<Layout> {
        let mut best = *self
            .layouts
            .first()
            .ok_or(StoreError::NoLayout { size })?;
        for layout in &self.layouts {
            if layout.group_size() <= size.max(1) {
                best = *layout;
            }
        }
        Ok(best)
    }

    /// Look up a layout by its persisted ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoLayout`] when the ID is unknown.
    pub fn by_id(&self, layout_id: u64) -> StoreResult<Layout> {
        self.layouts
            .iter()
            .find(|l| l.id == layout_id)
            .copied()
            .ok_or(StoreError::NoLayout { size: 0 })
    }

    /// The unit size of the layout with the given ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::NoLayout`] when the ID is unknown.
    pub fn unit_size(&self, layout_id: u64) -> StoreResult<u64> {
        Ok(self.by_id(layout_id)?.unit_size)
    }
}

impl Default for LayoutCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(unit: u64) -> Layout {
        Layout {
            id: 1,
            unit_size: unit,
            data_units: 4,
            parity_units: 2,
            spare_units: 0,
            pool_width: 8,
        }
    }

    #[test]
    fn test_should_round_up_and_down() {
        assert_eq!(roundup(0, 4096), 0);
        assert_eq!(roundup(1, 4096), 4096);
        assert_eq!(roundup(4096, 4096), 4096);
        assert_eq!(roundup(4097, 4096), 8192);
        assert_eq!(rounddown(4097, 4096), 4096);
        assert_eq!(rounddown(4095, 4096), 0);
    }

    #[test]
    fn test_should_compute_group_size() {
        assert_eq!(layout(64 * 1024).group_size(), 256 * 1024);
    }

    #[test]
    fn test_should_cap_block_size_at_saturation() {
        let l = layout(64 * 1024);
        // depth = 128 / ceil(64K/32K) = 64; max = 64 * 64K * 8 * 4 / 6,
        // rounded up to the 256K group size.
        let group = l.group_size();
        let expected = roundup(64 * 64 * 1024 * 8 * 4 / 6, group);
        assert_eq!(l.optimal_block_size(u64::MAX, false), expected);
        assert_eq!(expected % group, 0);
    }

    #[test]
    fn test_should_round_short_writes_to_group() {
        let l = layout(64 * 1024);
        assert_eq!(l.optimal_block_size(1, false), l.group_size());
        assert_eq!(
            l.optimal_block_size(l.group_size() + 1, false),
            2 * l.group_size()
        );
    }

    #[test]
    fn test_should_round_last_block_to_unit() {
        let l = layout(64 * 1024);
        assert_eq!(l.optimal_block_size(1, true), 64 * 1024);
        assert_eq!(l.optimal_block_size(64 * 1024 + 1, true), 128 * 1024);
    }

    #[test]
    fn test_should_use_minimum_depth_for_huge_units() {
        // 8 MiB units: 128 / 256 == 0, clamped to depth 1.
        let l = layout(8 * 1024 * 1024);
        let max = l.optimal_block_size(u64::MAX, false);
        assert!(max >= l.group_size());
    }

    #[test]
    fn test_should_find_layout_by_object_size() {
        let catalog = LayoutCatalog::standard();
        // Tiny objects land on the smallest tier.
        let small = catalog.find_by_objsize(1).expect("small layout");
        assert_eq!(small.unit_size, 16 * 1024);
        // Large objects land on the biggest tier whose group fits.
        let large = catalog.find_by_objsize(64 * 1024 * 1024).expect("large");
        assert_eq!(large.unit_size, 1024 * 1024);
    }

    #[test]
    fn test_should_error_on_empty_catalog() {
        let catalog = LayoutCatalog::new(Vec::new());
        let err = catalog.find_by_objsize(100).unwrap_err();
        assert!(matches!(err, StoreError::NoLayout { size: 100 }));
    }

    #[test]
    fn test_should_resolve_unit_size_by_id() {
        let catalog = LayoutCatalog::standard();
        let layout = catalog.find_by_objsize(1).expect("layout");
        assert_eq!(
            catalog.unit_size(layout.id).expect("unit size"),
            layout.unit_size
        );
        assert!(catalog.unit_size(999).is_err());
    }
}
