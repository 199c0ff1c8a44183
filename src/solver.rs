use crate::error::{GangsheetError, Result};
use crate::settings::validate;
use crate::shelf::{ShelfRoll, oversize_reason};
use crate::types::{
    DesignItem, FailureReason, Hundredths, OversizedItem, PackingSettings, PlacementResult, Roll,
    Size, px_to_hundredths,
};

/// Greedy shelf packer over an ordered item list.
///
/// Pure and deterministic: the same items and settings always yield the same
/// result, so a preview matches the final render and retries are idempotent.
pub struct Solver {
    settings: PackingSettings,
    group_by_modification: bool,
}

impl Solver {
    pub fn new(settings: PackingSettings, group_by_modification: bool) -> Self {
        Self {
            settings,
            group_by_modification,
        }
    }

    pub fn solve(&self, items: &[DesignItem]) -> Result<PlacementResult> {
        validate(&self.settings)?;
        if items.is_empty() {
            return Err(GangsheetError::NoPlaceableItems(
                "no design items to place".to_string(),
            ));
        }

        if let Some(bad) = items.iter().find(|i| i.width_px == 0 || i.height_px == 0) {
            return Err(GangsheetError::Validation(format!(
                "design item {} has invalid pixel size {}x{}",
                bad.id, bad.width_px, bad.height_px
            )));
        }

        let ordered = if self.group_by_modification {
            group_by_key(items)
        } else {
            items.iter().collect()
        };

        let mut rolls: Vec<Roll> = Vec::new();
        let mut failed = Vec::new();
        let mut current = ShelfRoll::new(self.settings);

        for item in ordered {
            let (size, reason) = measure(item, &self.settings);
            if let Some(reason) = reason {
                tracing::warn!(item = %item.id, order = item.order_id, %size, ?reason, "oversized design item");
                failed.push(oversized(item, size, reason));
                continue;
            }

            if current.try_place(item, size).is_some() {
                continue;
            }
            if !current.is_empty() {
                let full = std::mem::replace(&mut current, ShelfRoll::new(self.settings));
                rolls.push(full.into_roll(rolls.len() as u32 + 1));
                if current.try_place(item, size).is_some() {
                    continue;
                }
            }
            // oversize_reason admits only items that fit an empty roll
            tracing::error!(item = %item.id, %size, "empty roll rejected design item");
            failed.push(oversized(item, size, FailureReason::TooLong));
        }

        if !current.is_empty() {
            rolls.push(current.into_roll(rolls.len() as u32 + 1));
        }

        for roll in &rolls {
            tracing::debug!(
                roll = roll.roll_number,
                designs = roll.placements.len(),
                length = roll.max_height_used,
                "roll packed"
            );
        }

        Ok(PlacementResult::from_rolls(rolls, failed))
    }
}

/// Physical size at the roll's DPI and, if it can never be placed, why.
/// Sides that overflow [`Hundredths`] are reported as `Hundredths::MAX`.
fn measure(item: &DesignItem, settings: &PackingSettings) -> (Size, Option<FailureReason>) {
    let w = px_to_hundredths(item.width_px, settings.dpi);
    let h = px_to_hundredths(item.height_px, settings.dpi);
    let size = Size::new(w.unwrap_or(Hundredths::MAX), h.unwrap_or(Hundredths::MAX));
    let reason = match (w, h) {
        (None, _) => Some(FailureReason::TooWide),
        (_, None) => Some(FailureReason::TooLong),
        _ => oversize_reason(size, settings),
    };
    (size, reason)
}

fn oversized(item: &DesignItem, size: Size, reason: FailureReason) -> OversizedItem {
    OversizedItem {
        design_item_id: item.id.clone(),
        order_id: item.order_id,
        width: size.w,
        height: size.h,
        reason,
    }
}

/// Stable partition by group key, groups in order of first appearance.
/// Items without a key form their own group.
fn group_by_key(items: &[DesignItem]) -> Vec<&DesignItem> {
    let mut groups: Vec<(Option<&str>, Vec<&DesignItem>)> = Vec::new();
    for item in items {
        let key = item.group_key.as_deref();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }
    groups.into_iter().flat_map(|(_, members)| members).collect()
}
