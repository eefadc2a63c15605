//! Data model: caller-supplied inputs (`Part`, `Stock`), the engine's internal expansion of
//! them (`PartInstance`, `StockInstance`), and the result types returned from a run.
//!
//! Mirrors the teacher crate's `CutPiece` / `CutPieceWithId` / `UsedCutPiece` / `ResultCutPiece`
//! split: a public, caller-facing shape is expanded once at ingress into a densely-indexed
//! internal shape, and converted back to a public result shape only at the very end.

#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};

/// One of the four corners of a part where a mitre cut may be specified.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum Corner {
    /// Top-left corner.
    Tl,
    /// Top-right corner.
    Tr,
    /// Bottom-left corner.
    Bl,
    /// Bottom-right corner.
    Br,
}

impl Corner {
    /// The vertical side (`Side::L` or `Side::R`) that this corner belongs to. `Tl`/`Bl` are the
    /// left side, `Tr`/`Br` are the right side.
    pub(crate) fn side(self) -> Side {
        match self {
            Corner::Tl | Corner::Bl => Side::L,
            Corner::Tr | Corner::Br => Side::R,
        }
    }

    pub(crate) const ALL: [Corner; 4] = [Corner::Tl, Corner::Tr, Corner::Bl, Corner::Br];
}

/// Which end of a chain connection a part instance contributes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Side {
    L,
    R,
}

/// The four corner mitre angles of a part, in degrees, `0` meaning "no mitre" (a square cut).
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Angles {
    /// Top-left corner angle, in `[0, 89]` degrees.
    pub tl: u8,
    /// Top-right corner angle, in `[0, 89]` degrees.
    pub tr: u8,
    /// Bottom-left corner angle, in `[0, 89]` degrees.
    pub bl: u8,
    /// Bottom-right corner angle, in `[0, 89]` degrees.
    pub br: u8,
}

impl Angles {
    pub(crate) fn get(self, corner: Corner) -> u8 {
        match corner {
            Corner::Tl => self.tl,
            Corner::Tr => self.tr,
            Corner::Bl => self.bl,
            Corner::Br => self.br,
        }
    }

    /// True if the left/right pairing invariant holds: at most one non-zero angle per side.
    pub(crate) fn is_valid(self) -> bool {
        !(self.tl > 0 && self.bl > 0) && !(self.tr > 0 && self.br > 0)
    }

    pub(crate) fn all_zero(self) -> bool {
        self.tl == 0 && self.tr == 0 && self.bl == 0 && self.br == 0
    }
}

/// A part that needs to be cut, with its four corner angles and requested quantity.
///
/// `Part`s are borrowed inputs: the engine never mutates them, it only expands `quantity` into
/// internal [`PartInstance`]s once at ingress.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Part {
    /// Caller-stable identifier, used to match up result placements with this part.
    pub id: u32,

    /// Length of the part, in millimeters. Must be a positive integer.
    pub length: u32,

    /// How many instances of this part are needed. Must be at least 1.
    pub quantity: u32,

    /// The four corner mitre angles.
    pub angles: Angles,

    /// Material thickness in millimeters, used to compute shared-cut savings. `None` means the
    /// engine should compute a length- and angle-dependent default (see
    /// [`crate::matcher::default_thickness`]).
    pub thickness: Option<u32>,
}

/// Flip applied to a part instance so its mitred corner aligns with its chain neighbor.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Flip {
    /// No flip applied.
    #[default]
    None,
    /// Mirrored along the length axis.
    Horizontal,
    /// Mirrored along the width axis.
    Vertical,
    /// Both axes mirrored.
    Both,
}

/// `(part_id, instance_id)` - identifies one materialized copy of a `Part`.
pub(crate) type InstanceRef = (u32, u32);

/// A materialized copy of a `Part`, produced once per unit of `quantity`.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PartInstance {
    pub(crate) part_id: u32,
    pub(crate) instance_id: u32,
    pub(crate) length: u32,
    pub(crate) angles: Angles,
    pub(crate) thickness: u32,
    pub(crate) flipped: Flip,
}

impl PartInstance {
    pub(crate) fn instance_ref(&self) -> InstanceRef {
        (self.part_id, self.instance_id)
    }
}

/// A stock bar type that parts can be cut from. `quantity == 0` means unlimited supply.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Stock {
    /// Caller-stable identifier.
    pub id: u32,

    /// Length of the stock bar, in millimeters.
    pub length: u32,

    /// Number of bars of this type available. `0` means unlimited supply (allocated on demand).
    pub quantity: u32,
}

impl Stock {
    pub(crate) fn is_unlimited(&self) -> bool {
        self.quantity == 0
    }

    pub(crate) fn usable_length(&self, constraints: &crate::config::Constraints) -> f64 {
        (self.length as f64 - constraints.front_end_loss as f64 - constraints.back_end_loss as f64)
            .max(0.0)
    }
}

/// Extra information recorded on a `Placement` when its leading edge is a shared cut with the
/// previous placement in the same stock instance.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SharedCutInfo {
    /// Part id of the neighboring instance this placement shares its leading cut with.
    pub paired_part_id: u32,
    /// Instance id of the neighboring instance.
    pub paired_instance_id: u32,
    /// Material saved by sharing the cut, in millimeters.
    pub savings: f64,
}

/// One part instance placed within a stock instance.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Placement {
    /// Id of the part this placement belongs to.
    pub part_id: u32,
    /// Instance id within the part.
    pub instance_id: u32,
    /// Id of the stock type this placement was cut from.
    pub stock_id: u32,
    /// Index of the specific stock instance (bar) within its stock type.
    pub stock_instance_index: u32,
    /// Starting position within the stock instance, in millimeters from its leading edge.
    pub start_position: f64,
    /// Length consumed by this placement, in millimeters.
    pub length: f64,
    /// Flip applied to this instance, if its chain connection required one.
    pub flipped: Flip,
    /// Present when this placement's leading edge is a shared cut.
    pub shared_cut_info: Option<SharedCutInfo>,
}

/// A part instance the placer could not place anywhere, including virtual stock.
///
/// Under normal configuration this is always empty - the core contract is that every part is
/// placed, falling back to virtual stock rather than ever leaving one out.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct UnplacedPart {
    /// Id of the unplaced part.
    pub part_id: u32,
    /// Instance id within the part.
    pub instance_id: u32,
    /// Human readable reason it couldn't be placed.
    pub reason: String,
}

/// Summary of one stock instance (bar) used in the solution.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UsedStock {
    /// Id of the stock type.
    pub stock_id: u32,
    /// Index of this instance within its stock type.
    pub instance_index: u32,
    /// Fraction of usable length consumed, in `[0, 1]`.
    pub utilization: f64,
    /// True if this instance was fabricated by the engine as a last resort (no real stock fit).
    pub virtual_stock: bool,
}

/// Informational counters about a run, for callers that want to record their own timing
/// estimates. The engine itself never persists these; see `DESIGN.md` re: progress timing store.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RunStats {
    /// Total number of part instances in the run (`Σ part.quantity`).
    pub total_instances: usize,
    /// Number of part instances with at least one non-zero corner angle.
    pub angled_instances: usize,
    /// Number of distinct stock types supplied.
    pub stock_types: usize,
    /// Wall-clock duration of the run, in milliseconds.
    pub elapsed_ms: u64,
    /// Number of chains built (same-part and mixed).
    pub chains_built: u32,
}

/// The result of an optimization run.
#[cfg_attr(feature = "serialize", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serialize", serde(rename_all = "camelCase"))]
#[derive(Clone, Debug, PartialEq)]
pub struct PlacementResult {
    /// `true` unless the run was cancelled. A successful run may still be "degraded" (it used
    /// virtual stock) and still report `success = true`.
    pub success: bool,

    /// Every placed part instance.
    pub placed_parts: Vec<Placement>,

    /// Part instances that could not be placed. Expected to be empty under normal configuration.
    pub unplaced_parts: Vec<UnplacedPart>,

    /// Every stock instance (bar) used, with its utilization.
    pub used_stock: Vec<UsedStock>,

    /// Total number of chains built.
    pub chains_built: u32,

    /// Number of those chains that mix more than one part type.
    pub mixed_chains: u32,

    /// Total material saved by shared cuts, in millimeters.
    pub total_savings: f64,

    /// Human-readable warnings (virtual stock used, chain split, cancellation, ...).
    pub warnings: Vec<String>,
}
