use crate::types::{
    DesignItem, FailureReason, Hundredths, PackingSettings, Placement, Roll, Size,
};

/// Returns why `size` can never fit on an empty roll, if it can't.
///
/// An unbounded roll is still limited by the range of [`Hundredths`].
pub fn oversize_reason(size: Size, settings: &PackingSettings) -> Option<FailureReason> {
    if size.w > settings.roll_width.saturating_sub(settings.margin_left) {
        return Some(FailureReason::TooWide);
    }
    let limit = settings.roll_length.limit().unwrap_or(Hundredths::MAX);
    if size.h > limit.saturating_sub(settings.margin_top) {
        return Some(FailureReason::TooLong);
    }
    None
}

/// A single roll being filled row by row, left to right.
///
/// The cursor is tracked in `u64` so gap-inflated sums cannot wrap.
#[derive(Debug, Clone)]
pub struct ShelfRoll {
    settings: PackingSettings,
    x: u64,
    y: u64,
    row_height: u64,
    pub placements: Vec<Placement>,
}

impl ShelfRoll {
    pub fn new(settings: PackingSettings) -> Self {
        Self {
            settings,
            x: settings.margin_left as u64,
            y: settings.margin_top as u64,
            row_height: 0,
            placements: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Places `item` at the cursor, opening a new row when it would overflow the
    /// roll width. Returns `None` when the roll has no length left for it.
    ///
    /// The caller must have rejected oversized items with [`oversize_reason`].
    pub fn try_place(&mut self, item: &DesignItem, size: Size) -> Option<Placement> {
        let gap = self.settings.gap_between_items as u64;
        let margin_left = self.settings.margin_left as u64;
        let effective_w = size.w as u64 + gap;
        let effective_h = size.h as u64 + gap;

        let (mut x, mut y, mut row_height) = (self.x, self.y, self.row_height);
        if x > margin_left && x + effective_w > self.settings.roll_width as u64 {
            y += row_height;
            x = margin_left;
            row_height = 0;
        }

        // An empty roll always takes the item, so a retry on a fresh roll cannot loop.
        let limit = self.settings.roll_length.limit().unwrap_or(Hundredths::MAX) as u64;
        if !self.is_empty() && y + effective_h > limit {
            return None;
        }

        let placement = Placement {
            design_item_id: item.id.clone(),
            order_id: item.order_id,
            group_key: item.group_key.clone(),
            x: Hundredths::try_from(x).ok()?,
            y: Hundredths::try_from(y).ok()?,
            width: size.w,
            height: size.h,
        };
        self.x = x + effective_w;
        self.y = y;
        self.row_height = row_height.max(effective_h);
        self.placements.push(placement.clone());
        Some(placement)
    }

    pub fn into_roll(self, roll_number: u32) -> Roll {
        Roll::new(roll_number, self.settings.roll_width, self.placements)
    }
}
