// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Scene item flag bits and the four-part filter predicate used to select items per pass.

use bitflags::bitflags;

bitflags! {
    /// Flag bits carried by every scene item (meshes, lights, cameras).
    ///
    /// Render passes never look at item types directly: they select what to draw
    /// purely through an [`ItemFilter`] over these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ItemFlags: u64 {
        /// The item is drawn at all.
        const VISIBLE = 1 << 0;
        /// The item belongs to the user's content (as opposed to tooling).
        const CONTENT = 1 << 1;
        /// The item is shown in the editor item tree.
        const SHOW_IN_UI = 1 << 2;
        /// The item participates in object picking.
        const ID = 1 << 3;
        /// The item is a tool gizmo.
        const TOOL = 1 << 4;
        /// The item is a brush preview.
        const BRUSH = 1 << 5;
        /// The item is a render target mesh (in-scene display surface).
        const RENDERTARGET = 1 << 6;
        /// The item is a controller (e.g. a tracked device model).
        const CONTROLLER = 1 << 7;
        /// The item is currently selected.
        const SELECTED = 1 << 8;
        /// The item is hovered in the viewport.
        const HOVERED_IN_VIEWPORT = 1 << 9;
        /// The item is hovered in the item tree.
        const HOVERED_IN_ITEM_TREE = 1 << 10;
        /// The item is drawn with blending.
        const TRANSLUCENT = 1 << 11;
        /// The item is drawn without blending.
        const OPAQUE = 1 << 12;
        /// The item casts shadows.
        const SHADOW_CAST = 1 << 13;
        /// The item's world transform mirrors geometry, flipping triangle winding.
        const NEGATIVE_DETERMINANT = 1 << 14;
        /// Debug visualizations are drawn for the item.
        const SHOW_DEBUG_VISUALIZATIONS = 1 << 15;
        /// The item cannot be selected from the viewport.
        const LOCK_VIEWPORT_SELECTION = 1 << 16;
        /// The item cannot be transformed from the viewport.
        const LOCK_VIEWPORT_TRANSFORM = 1 << 17;
    }
}

impl ItemFlags {
    /// Formats the set bits as `NAME | NAME`, or `(none)` when empty.
    pub fn to_names(self) -> String {
        if self.is_empty() {
            return "(none)".to_string();
        }
        self.iter_names()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

/// A four-part bitmask predicate over [`ItemFlags`].
///
/// An item passes when all of the following hold:
/// - every bit in `require_all_bits_set` is set,
/// - at least one bit in `require_at_least_one_bit_set` is set (or the mask is empty),
/// - every bit in `require_all_bits_clear` is clear,
/// - at least one bit in `require_at_least_one_bit_clear` is clear (or the mask is empty).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ItemFilter {
    /// Bits that must all be set.
    pub require_all_bits_set: ItemFlags,
    /// Bits of which at least one must be set.
    pub require_at_least_one_bit_set: ItemFlags,
    /// Bits that must all be clear.
    pub require_all_bits_clear: ItemFlags,
    /// Bits of which at least one must be clear.
    pub require_at_least_one_bit_clear: ItemFlags,
}

impl ItemFilter {
    /// A filter that accepts every item.
    pub const ALL: Self = Self {
        require_all_bits_set: ItemFlags::empty(),
        require_at_least_one_bit_set: ItemFlags::empty(),
        require_all_bits_clear: ItemFlags::empty(),
        require_at_least_one_bit_clear: ItemFlags::empty(),
    };

    /// A filter that only requires `flags` to be set.
    pub const fn require_all(flags: ItemFlags) -> Self {
        Self {
            require_all_bits_set: flags,
            require_at_least_one_bit_set: ItemFlags::empty(),
            require_all_bits_clear: ItemFlags::empty(),
            require_at_least_one_bit_clear: ItemFlags::empty(),
        }
    }

    /// Returns `true` if an item with `flags` passes the filter.
    pub fn matches(&self, flags: ItemFlags) -> bool {
        if !flags.contains(self.require_all_bits_set) {
            return false;
        }
        if !self.require_at_least_one_bit_set.is_empty()
            && !flags.intersects(self.require_at_least_one_bit_set)
        {
            return false;
        }
        if flags.intersects(self.require_all_bits_clear) {
            return false;
        }
        if !self.require_at_least_one_bit_clear.is_empty()
            && flags.contains(self.require_at_least_one_bit_clear)
        {
            return false;
        }
        true
    }

    /// A one-line human readable summary of all four masks.
    pub fn describe(&self) -> String {
        format!(
            "all set = {}, at least one set = {}, all clear = {}, at least one clear = {}",
            self.require_all_bits_set.to_names(),
            self.require_at_least_one_bit_set.to_names(),
            self.require_all_bits_clear.to_names(),
            self.require_at_least_one_bit_clear.to_names(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_accepts_everything() {
        assert!(ItemFilter::ALL.matches(ItemFlags::empty()));
        assert!(ItemFilter::ALL.matches(ItemFlags::all()));
    }

    #[test]
    fn test_require_all_bits_set() {
        let filter = ItemFilter::require_all(ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST);

        assert!(filter.matches(ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST));
        assert!(filter.matches(ItemFlags::VISIBLE | ItemFlags::SHADOW_CAST | ItemFlags::CONTENT));
        assert!(!filter.matches(ItemFlags::VISIBLE));
        assert!(!filter.matches(ItemFlags::SHADOW_CAST));
        assert!(!filter.matches(ItemFlags::empty()));
    }

    #[test]
    fn test_require_at_least_one_bit_set() {
        let filter = ItemFilter {
            require_at_least_one_bit_set: ItemFlags::CONTENT | ItemFlags::CONTROLLER,
            ..ItemFilter::ALL
        };

        assert!(filter.matches(ItemFlags::CONTENT));
        assert!(filter.matches(ItemFlags::CONTROLLER));
        assert!(!filter.matches(ItemFlags::TOOL));
    }

    #[test]
    fn test_require_clear_masks() {
        let filter = ItemFilter {
            require_all_bits_clear: ItemFlags::TRANSLUCENT | ItemFlags::SELECTED,
            require_at_least_one_bit_clear: ItemFlags::TOOL | ItemFlags::BRUSH,
            ..ItemFilter::ALL
        };

        assert!(filter.matches(ItemFlags::VISIBLE));
        assert!(filter.matches(ItemFlags::TOOL));
        assert!(!filter.matches(ItemFlags::SELECTED));
        assert!(!filter.matches(ItemFlags::TOOL | ItemFlags::BRUSH));
    }

    #[test]
    fn test_describe_lists_flag_names() {
        let filter = ItemFilter::require_all(ItemFlags::VISIBLE | ItemFlags::OPAQUE);
        let text = filter.describe();

        assert!(text.contains("visible | opaque"));
        assert!(text.contains("all clear = (none)"));
    }
}
