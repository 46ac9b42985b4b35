//! Column width resolution and per-column style computation.
//!
//! Widths are resolved with a fixed-point pass: fixed columns first, then the
//! leftover is shared among fraction columns. A fraction column whose share
//! hits its clamp is pinned and the remaining columns are redistributed.

use crate::{ColumnState, ColumnWidth};

/// Padding added to a header title's estimated width (sort/filter glyphs).
pub const HEADER_PADDING: f64 = 32.0;

/// Estimated width of one header character.
pub const HEADER_CHAR_WIDTH: f64 = 8.0;

/// Estimated intrinsic width of a column header.
pub fn header_intrinsic_width(column: &ColumnState) -> f64 {
    column.title.chars().count() as f64 * HEADER_CHAR_WIDTH + HEADER_PADDING
}

/// Lower/upper clamp of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidthBounds {
    pub min: f64,
    pub max: Option<f64>,
}

impl WidthBounds {
    pub fn of(column: &ColumnState, intrinsic: f64) -> Self {
        let min = column.min_width.unwrap_or(0.0).max(intrinsic).max(0.0);
        let max = column.max_width.map(|max| max.max(min));
        Self { min, max }
    }

    pub fn clamp(&self, width: f64) -> f64 {
        let width = width.max(self.min);
        match self.max {
            Some(max) => width.min(max),
            None => width,
        }
    }

    /// Rounds to whole pixels, then clamps, so a fractional bound is never
    /// overshot by rounding.
    pub fn clamp_rounded(&self, width: f64) -> f64 {
        self.clamp(width.round())
    }
}

/// Resolves each column's width in pixels.
///
/// `widths[i]` is the configured width of column `i`, `bounds[i]` its clamp.
/// Returned widths are whole pixels unless a bound is fractional. Fraction columns absorb the leftover of
/// `total_width` after fixed columns, in proportion to their weight.
pub fn reflow_widths(widths: &[ColumnWidth], bounds: &[WidthBounds], total_width: f64) -> Vec<f64> {
    debug_assert_eq!(widths.len(), bounds.len());

    let mut resolved = vec![0.0; widths.len()];
    let mut pool: Vec<usize> = Vec::new();
    let mut fixed_sum = 0.0;

    for (i, width) in widths.iter().enumerate() {
        match width {
            ColumnWidth::Pixels(px) => {
                resolved[i] = bounds[i].clamp_rounded(*px);
                fixed_sum += resolved[i];
            }
            ColumnWidth::Percent(pct) => {
                resolved[i] = bounds[i].clamp_rounded(total_width * pct / 100.0);
                fixed_sum += resolved[i];
            }
            ColumnWidth::Fraction(_) => pool.push(i),
        }
    }

    let mut leftover = (total_width - fixed_sum).max(0.0);
    let mut weight_sum: f64 = pool.iter().map(|&i| weight(&widths[i])).sum();

    loop {
        if pool.is_empty() {
            break;
        }

        let mut remaining = leftover;
        let mut remaining_weight = weight_sum;
        let mut pinned: Option<(usize, f64)> = None;

        for (slot, &i) in pool.iter().enumerate() {
            let w = weight(&widths[i]);
            let desired = if remaining_weight > 0.0 {
                (remaining * w / remaining_weight).round()
            } else {
                0.0
            };
            let clamped = bounds[i].clamp(desired);

            if clamped != desired {
                pinned = Some((slot, clamped));
                break;
            }

            resolved[i] = desired;
            remaining = (remaining - desired).max(0.0);
            remaining_weight -= w;
        }

        match pinned {
            None => break,
            Some((slot, width)) => {
                let i = pool.remove(slot);
                resolved[i] = width;
                leftover = (leftover - resolved[i]).max(0.0);
                weight_sum = (weight_sum - weight(&widths[i])).max(0.0);
            }
        }
    }

    resolved
}

fn weight(width: &ColumnWidth) -> f64 {
    match width {
        ColumnWidth::Fraction(fr) if *fr > 0.0 => *fr,
        _ => 0.0,
    }
}

/// Resolved geometry and CSS of one visible column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnStyle {
    pub column_key: String,
    pub width: f64,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    /// Sticky offset from the left edge; `None` for scrolling columns.
    pub sticky_left: Option<f64>,
    pub last_frozen: bool,
    pub group_start: bool,
    pub group_end: bool,
    pub align: &'static str,
}

impl ColumnStyle {
    /// CSS declarations for the column's cells.
    pub fn declarations(&self) -> Vec<(String, String)> {
        let mut css = vec![("text-align".to_string(), self.align.to_string())];

        if let Some(min) = self.min_width {
            css.push(("min-width".into(), format!("{}px", min)));
        }
        if let Some(max) = self.max_width {
            css.push(("max-width".into(), format!("{}px", max)));
        }
        if let Some(left) = self.sticky_left {
            css.push(("position".into(), "sticky".into()));
            css.push(("left".into(), format!("{}px", left)));
            css.push(("z-index".into(), "2".into()));
        }
        if self.last_frozen {
            css.push(("border-right".into(), "2px solid var(--lg-frozen-separator)".into()));
        }
        if self.group_start {
            css.push(("border-left".into(), "1px solid var(--lg-group-border)".into()));
        }
        if self.group_end {
            css.push(("border-right".into(), "1px solid var(--lg-group-border)".into()));
        }
        css
    }

    pub fn to_css(&self) -> String {
        self.declarations()
            .into_iter()
            .map(|(k, v)| format!("{}: {};", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Slots of the CSS grid template, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct GridTemplate {
    pub indent_slots: Vec<f64>,
    pub selection_slot: Option<f64>,
    pub column_slots: Vec<f64>,
}

impl GridTemplate {
    pub fn total_width(&self) -> f64 {
        self.indent_slots.iter().sum::<f64>()
            + self.selection_slot.unwrap_or(0.0)
            + self.column_slots.iter().sum::<f64>()
    }

    /// `grid-template-columns` value.
    pub fn to_css(&self) -> String {
        self.indent_slots
            .iter()
            .chain(self.selection_slot.iter())
            .chain(self.column_slots.iter())
            .map(|w| format!("{}px", w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Input of one layout computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutParams {
    pub total_width: f64,
    pub group_levels: usize,
    pub group_indent_width: f64,
    pub selection_column_width: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    pub template: GridTemplate,
    pub columns: Vec<ColumnStyle>,
}

impl GridLayout {
    pub fn column(&self, key: &str) -> Option<&ColumnStyle> {
        self.columns.iter().find(|c| c.column_key == key)
    }
}

/// Computes the template and per-column styles for the visible columns,
/// given in display order.
pub fn compute_layout(
    visible: &[&ColumnState],
    params: LayoutParams,
    intrinsic: impl Fn(&ColumnState) -> f64,
) -> GridLayout {
    let indent_slots = vec![params.group_indent_width; params.group_levels];
    let reserved = indent_slots.iter().sum::<f64>() + params.selection_column_width.unwrap_or(0.0);
    let available = (params.total_width - reserved).max(0.0);

    let widths: Vec<ColumnWidth> = visible.iter().map(|c| c.calculated_width).collect();
    let bounds: Vec<WidthBounds> = visible
        .iter()
        .map(|c| WidthBounds::of(c, intrinsic(c)))
        .collect();
    let resolved = reflow_widths(&widths, &bounds, available);

    let last_frozen = visible.iter().rposition(|c| c.frozen);
    let mut frozen_offset = reserved;
    let mut styles = Vec::with_capacity(visible.len());

    for (i, column) in visible.iter().enumerate() {
        let sticky_left = if column.frozen {
            let left = frozen_offset;
            frozen_offset += resolved[i];
            Some(left)
        } else {
            None
        };

        let group = column.group_name.as_ref();
        let prev_group = i.checked_sub(1).and_then(|p| visible[p].group_name.as_ref());
        let next_group = visible.get(i + 1).and_then(|n| n.group_name.as_ref());

        styles.push(ColumnStyle {
            column_key: column.unique_key.clone(),
            width: resolved[i],
            min_width: column.min_width,
            max_width: column.max_width,
            sticky_left,
            last_frozen: Some(i) == last_frozen,
            group_start: group.is_some() && prev_group != group,
            group_end: group.is_some() && next_group != group,
            align: column.value_type.alignment(),
        });
    }

    GridLayout {
        template: GridTemplate {
            indent_slots,
            selection_slot: params.selection_column_width,
            column_slots: resolved,
        },
        columns: styles,
    }
}
