use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Physical length in hundredths of an inch.
pub type Hundredths = u32;

pub type OrderId = i64;

/// Converts whole inches to [`Hundredths`].
pub const fn inches(n: u32) -> Hundredths {
    n * 100
}

/// Converts a pixel extent to hundredths of an inch at the given DPI, rounding up
/// so the placed rectangle always covers the artwork. `None` when the extent does
/// not fit in [`Hundredths`] or `dpi` is zero.
pub fn px_to_hundredths(px: u32, dpi: u32) -> Option<Hundredths> {
    if dpi == 0 {
        return None;
    }
    Hundredths::try_from((px as u64 * 100).div_ceil(dpi as u64)).ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub w: Hundredths,
    pub h: Hundredths,
}

impl Size {
    pub fn new(w: Hundredths, h: Hundredths) -> Self {
        Self { w, h }
    }

    pub fn area(&self) -> u64 {
        self.w as u64 * self.h as u64
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{:02}x{}.{:02}in",
            self.w / 100,
            self.w % 100,
            self.h / 100,
            self.h % 100
        )
    }
}

/// Maximum length of a single roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollLength {
    Bounded(Hundredths),
    #[default]
    Unbounded,
}

impl RollLength {
    pub fn limit(&self) -> Option<Hundredths> {
        match self {
            RollLength::Bounded(l) => Some(*l),
            RollLength::Unbounded => None,
        }
    }
}

impl Serialize for RollLength {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.limit().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RollLength {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Hundredths>::deserialize(deserializer)? {
            Some(l) => RollLength::Bounded(l),
            None => RollLength::Unbounded,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackingSettings {
    pub roll_width: Hundredths,
    #[serde(default)]
    pub roll_length: RollLength,
    pub dpi: u32,
    #[serde(default)]
    pub gap_between_items: Hundredths,
    #[serde(default)]
    pub margin_top: Hundredths,
    #[serde(default)]
    pub margin_left: Hundredths,
}

impl Default for PackingSettings {
    fn default() -> Self {
        Self {
            roll_width: inches(22),
            roll_length: RollLength::Bounded(inches(200)),
            dpi: 300,
            gap_between_items: 25,
            margin_top: 25,
            margin_left: 25,
        }
    }
}

/// One placeable unit of artwork.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignItem {
    pub id: String,
    pub order_id: OrderId,
    pub group_key: Option<String>,
    pub width_px: u32,
    pub height_px: u32,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub design_item_id: String,
    pub order_id: OrderId,
    pub group_key: Option<String>,
    pub x: Hundredths,
    pub y: Hundredths,
    pub width: Hundredths,
    pub height: Hundredths,
}

impl Placement {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Roll {
    pub roll_number: u32,
    pub max_height_used: Hundredths,
    pub placements: Vec<Placement>,
    pub order_ids: Vec<OrderId>,
    pub utilization: f64,
}

impl Roll {
    pub fn new(roll_number: u32, roll_width: Hundredths, placements: Vec<Placement>) -> Self {
        let max_height_used = placements
            .iter()
            .map(|p| p.y.saturating_add(p.height))
            .max()
            .unwrap_or(0);
        let order_ids: BTreeSet<OrderId> = placements.iter().map(|p| p.order_id).collect();
        let used: u64 = placements.iter().map(|p| p.size().area()).sum();
        let total = roll_width as u64 * max_height_used as u64;
        let utilization = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64
        };
        Self {
            roll_number,
            max_height_used,
            placements,
            order_ids: order_ids.into_iter().collect(),
            utilization,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    TooWide,
    TooLong,
}

/// An item that cannot fit even alone on an empty roll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OversizedItem {
    pub design_item_id: String,
    pub order_id: OrderId,
    pub width: Hundredths,
    pub height: Hundredths,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementResult {
    pub total_designs: usize,
    pub total_rolls: usize,
    pub rolls: Vec<Roll>,
    pub failed: Vec<OversizedItem>,
}

impl PlacementResult {
    pub fn from_rolls(rolls: Vec<Roll>, failed: Vec<OversizedItem>) -> Self {
        Self {
            total_designs: rolls.iter().map(|r| r.placements.len()).sum(),
            total_rolls: rolls.len(),
            rolls,
            failed,
        }
    }

    pub fn total_length_used(&self) -> u64 {
        self.rolls.iter().map(|r| r.max_height_used as u64).sum()
    }
}
