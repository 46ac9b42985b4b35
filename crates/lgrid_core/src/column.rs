use serde::{Deserialize, Serialize};

use crate::{CellValueType, ColumnFilter, FieldDefinition};

/// Maximum number of columns that can be sorted at the same time.
pub const MAX_SORTED_COLUMNS: usize = 4;

/// Width of a column as configured or computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "unit", content = "value", rename_all = "snake_case")]
pub enum ColumnWidth {
    Pixels(f64),
    /// Percentage of the total available width.
    Percent(f64),
    /// Share of the leftover width, like a CSS `fr` unit.
    Fraction(f64),
}

impl Default for ColumnWidth {
    fn default() -> Self {
        ColumnWidth::Fraction(1.0)
    }
}

impl ColumnWidth {
    pub fn is_flexible(&self) -> bool {
        matches!(self, ColumnWidth::Fraction(_))
    }

    pub fn value(&self) -> f64 {
        match self {
            ColumnWidth::Pixels(v) | ColumnWidth::Percent(v) | ColumnWidth::Fraction(v) => *v,
        }
    }

    /// CSS representation of the width.
    pub fn to_css(&self) -> String {
        match self {
            ColumnWidth::Pixels(v) => format!("{}px", v),
            ColumnWidth::Percent(v) => format!("{}%", v),
            ColumnWidth::Fraction(v) => format!("{}fr", v),
        }
    }

    /// Parses `"120px"`, `"25%"` or `"2fr"`. A bare number is read as pixels.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let (number, ctor): (&str, fn(f64) -> ColumnWidth) =
            if let Some(n) = input.strip_suffix("px") {
                (n, ColumnWidth::Pixels)
            } else if let Some(n) = input.strip_suffix('%') {
                (n, ColumnWidth::Percent)
            } else if let Some(n) = input.strip_suffix("fr") {
                (n, ColumnWidth::Fraction)
            } else {
                (input, ColumnWidth::Pixels)
            };

        let value = number.trim().parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some(ctor(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    None,
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn is_active(&self) -> bool {
        !matches!(self, SortDirection::None)
    }

    /// none -> ascending -> descending -> none
    pub fn cycle(&self) -> Self {
        match self {
            SortDirection::None => SortDirection::Ascending,
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::None,
        }
    }
}

/// Per-column aggregate shown in the footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CalculationType {
    #[default]
    None,
    Sum,
    Average,
    Count,
    Min,
    Max,
}

impl CalculationType {
    pub fn is_active(&self) -> bool {
        !matches!(self, CalculationType::None)
    }

    pub fn label(&self) -> &'static str {
        match self {
            CalculationType::None => "",
            CalculationType::Sum => "Sum",
            CalculationType::Average => "Avg",
            CalculationType::Count => "Count",
            CalculationType::Min => "Min",
            CalculationType::Max => "Max",
        }
    }

    /// Whether the calculation applies to a column of the given type.
    pub fn supports(&self, value_type: CellValueType) -> bool {
        match self {
            CalculationType::Sum | CalculationType::Average => value_type.is_numeric(),
            _ => true,
        }
    }
}

/// Mutable state of one bindable column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnState {
    pub unique_key: String,
    pub field: String,
    pub title: String,
    /// Declaration slot; never changes after the column set is built.
    pub index: usize,
    /// 1-based display order, shared by visible and hidden columns.
    pub order: usize,
    pub visible: bool,
    pub frozen: bool,
    pub initial_width: ColumnWidth,
    pub calculated_width: ColumnWidth,
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub value_type: CellValueType,
    pub format: Option<String>,
    pub group_name: Option<String>,
    pub sort_direction: SortDirection,
    pub sorting_order: Option<usize>,
    pub filter: Option<ColumnFilter>,
    pub calculation: CalculationType,
    pub exportable: bool,
    pub allow_sort: bool,
    pub allow_filter: bool,
    pub allow_hide: bool,
    pub allow_group: bool,
    /// Positive: span of a group header starting here. Negative: hidden
    /// continuation cell of a span. Zero: not grouped.
    pub header_col_span: i32,
}

impl ColumnState {
    pub fn new(unique_key: impl Into<String>, field: impl Into<String>, index: usize) -> Self {
        let field = field.into();
        Self {
            unique_key: unique_key.into(),
            title: field.clone(),
            field,
            index,
            order: index + 1,
            visible: true,
            frozen: false,
            initial_width: ColumnWidth::default(),
            calculated_width: ColumnWidth::default(),
            min_width: None,
            max_width: None,
            value_type: CellValueType::Text,
            format: None,
            group_name: None,
            sort_direction: SortDirection::None,
            sorting_order: None,
            filter: None,
            calculation: CalculationType::None,
            exportable: true,
            allow_sort: true,
            allow_filter: true,
            allow_hide: true,
            allow_group: true,
            header_col_span: 0,
        }
    }

    pub fn from_definition<T>(definition: &FieldDefinition<T>, key: String, index: usize) -> Self {
        let mut column = Self::new(key, definition.name.clone(), index);
        column.title = definition.title.clone();
        column.value_type = definition.value_type;
        column.group_name = definition.group_name.clone();
        column
    }

    pub fn with_width(mut self, width: ColumnWidth) -> Self {
        self.initial_width = width;
        self.calculated_width = width;
        self
    }

    pub fn with_bounds(mut self, min_width: Option<f64>, max_width: Option<f64>) -> Self {
        self.min_width = min_width;
        self.max_width = max_width;
        self
    }

    pub fn has_active_filter(&self) -> bool {
        self.filter.as_ref().is_some_and(|f| !f.is_blank())
    }
}

/// Ordered collection of column states for one grid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSet {
    columns: Vec<ColumnState>,
}

impl ColumnSet {
    pub fn new(mut columns: Vec<ColumnState>) -> Self {
        for (index, column) in columns.iter_mut().enumerate() {
            column.index = index;
        }
        let mut set = Self { columns };
        set.normalize_order();
        set.update_header_spans();
        set
    }

    /// Builds the column set from field definitions, keyed by `build_key`.
    pub fn from_definitions<T>(
        definitions: &[FieldDefinition<T>],
        build_key: impl Fn(&str) -> String,
    ) -> Self {
        let columns = definitions
            .iter()
            .enumerate()
            .map(|(index, definition)| {
                ColumnState::from_definition(definition, build_key(&definition.name), index)
            })
            .collect();
        Self::new(columns)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnState> {
        self.columns.iter()
    }

    pub fn get(&self, key: &str) -> Option<&ColumnState> {
        self.columns.iter().find(|c| c.unique_key == key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ColumnState> {
        self.columns.iter_mut().find(|c| c.unique_key == key)
    }

    /// Columns in display order, hidden ones included.
    pub fn ordered(&self) -> Vec<&ColumnState> {
        let mut ordered: Vec<&ColumnState> = self.columns.iter().collect();
        ordered.sort_by_key(|c| (c.order, c.index));
        ordered
    }

    /// Visible columns in display order.
    pub fn visible(&self) -> Vec<&ColumnState> {
        self.ordered().into_iter().filter(|c| c.visible).collect()
    }

    /// Restores declaration order: visible columns first, hidden ones after.
    pub fn reset_order(&mut self) {
        let mut keys: Vec<(bool, usize, usize)> = self
            .columns
            .iter()
            .enumerate()
            .map(|(pos, c)| (!c.visible, c.index, pos))
            .collect();
        keys.sort();

        for (order, (_, _, pos)) in keys.into_iter().enumerate() {
            self.columns[pos].order = order + 1;
        }
        self.update_header_spans();
    }

    /// Renumbers `order` to a gap-free 1..N permutation, keeping the current
    /// relative order (ties broken by declaration index).
    pub fn normalize_order(&mut self) {
        let mut positions: Vec<usize> = (0..self.columns.len()).collect();
        positions.sort_by_key(|&pos| (self.columns[pos].order, self.columns[pos].index));

        for (order, pos) in positions.into_iter().enumerate() {
            self.columns[pos].order = order + 1;
        }
    }

    /// Moves a column to a 1-based position among all columns.
    pub fn move_column(&mut self, key: &str, position: usize) -> bool {
        let ordered: Vec<String> = self
            .ordered()
            .into_iter()
            .map(|c| c.unique_key.clone())
            .collect();

        let Some(from) = ordered.iter().position(|k| k == key) else {
            return false;
        };

        let mut reordered = ordered;
        let moved = reordered.remove(from);
        let target = position.clamp(1, reordered.len() + 1) - 1;
        reordered.insert(target, moved);

        self.apply_key_order(&reordered);
        self.update_header_spans();
        true
    }

    /// Assigns orders following `keys`; columns not listed keep their relative
    /// order after the listed ones.
    pub fn apply_key_order(&mut self, keys: &[String]) {
        let mut next = 1;
        for key in keys {
            if let Some(column) = self.columns.iter_mut().find(|c| &c.unique_key == key) {
                column.order = next;
                next += 1;
            }
        }

        let mut rest: Vec<usize> = (0..self.columns.len())
            .filter(|&pos| !keys.contains(&self.columns[pos].unique_key))
            .collect();
        rest.sort_by_key(|&pos| (self.columns[pos].order, self.columns[pos].index));

        for pos in rest {
            self.columns[pos].order = next;
            next += 1;
        }
    }

    pub fn set_visible(&mut self, key: &str, visible: bool) -> bool {
        let Some(column) = self.get_mut(key) else {
            return false;
        };
        if !visible && !column.allow_hide {
            return false;
        }
        column.visible = visible;
        if !visible {
            column.frozen = false;
        }
        self.update_header_spans();
        true
    }

    /// Freezes or unfreezes a column. Frozen columns move in front of the
    /// unfrozen ones, keeping their relative order.
    pub fn set_frozen(&mut self, key: &str, frozen: bool) -> bool {
        let Some(column) = self.get_mut(key) else {
            return false;
        };
        column.frozen = frozen;

        let mut ordered: Vec<(bool, usize, String)> = self
            .columns
            .iter()
            .map(|c| (!c.frozen, c.order, c.unique_key.clone()))
            .collect();
        ordered.sort();
        let keys: Vec<String> = ordered.into_iter().map(|(_, _, k)| k).collect();

        self.apply_key_order(&keys);
        self.update_header_spans();
        true
    }

    pub fn set_width(&mut self, key: &str, width: ColumnWidth) -> bool {
        let Some(column) = self.get_mut(key) else {
            return false;
        };
        column.calculated_width = width;
        true
    }

    pub fn reset_widths(&mut self) {
        for column in &mut self.columns {
            column.calculated_width = column.initial_width;
        }
    }

    /// Cycles the sort direction of a column.
    ///
    /// With `additive`, other sorted columns are kept; otherwise the clicked
    /// column becomes the only sort. At most [`MAX_SORTED_COLUMNS`] columns
    /// stay sorted: the oldest sort is dropped when the cap is exceeded.
    pub fn toggle_sort(&mut self, key: &str, additive: bool) -> Option<SortDirection> {
        let column = self.get(key)?;
        if !column.allow_sort {
            return None;
        }
        let next = column.sort_direction.cycle();
        self.set_sort(key, next, additive);
        Some(next)
    }

    pub fn set_sort(&mut self, key: &str, direction: SortDirection, additive: bool) {
        if !additive {
            for column in self.columns.iter_mut().filter(|c| c.unique_key != key) {
                column.sort_direction = SortDirection::None;
                column.sorting_order = None;
            }
        }

        let Some(column) = self.get_mut(key) else {
            return;
        };

        let was_sorted = column.sort_direction.is_active();
        column.sort_direction = direction;

        if !direction.is_active() {
            column.sorting_order = None;
        } else if !was_sorted {
            column.sorting_order = Some(usize::MAX);
        }

        self.normalize_sorting();
    }

    pub fn clear_sort(&mut self) {
        for column in &mut self.columns {
            column.sort_direction = SortDirection::None;
            column.sorting_order = None;
        }
    }

    /// Compacts sorting orders to 1..k and enforces the cap.
    pub fn normalize_sorting(&mut self) {
        let mut sorted: Vec<usize> = (0..self.columns.len())
            .filter(|&pos| self.columns[pos].sort_direction.is_active())
            .collect();
        sorted.sort_by_key(|&pos| {
            (
                self.columns[pos].sorting_order.unwrap_or(usize::MAX),
                self.columns[pos].index,
            )
        });

        let overflow = sorted.len().saturating_sub(MAX_SORTED_COLUMNS);
        for &pos in &sorted[..overflow] {
            self.columns[pos].sort_direction = SortDirection::None;
            self.columns[pos].sorting_order = None;
        }

        for (order, &pos) in sorted[overflow..].iter().enumerate() {
            self.columns[pos].sorting_order = Some(order + 1);
        }
    }

    pub fn set_filter(&mut self, key: &str, filter: Option<ColumnFilter>) -> bool {
        let Some(column) = self.get_mut(key) else {
            return false;
        };
        column.filter = filter.filter(|f| !f.is_blank());
        true
    }

    pub fn clear_filters(&mut self) {
        for column in &mut self.columns {
            column.filter = None;
        }
    }

    pub fn set_calculation(&mut self, key: &str, calculation: CalculationType) -> bool {
        let Some(column) = self.get_mut(key) else {
            return false;
        };
        if !calculation.supports(column.value_type) {
            return false;
        }
        column.calculation = calculation;
        true
    }

    /// Recomputes `header_col_span` over the visible columns: the first column
    /// of a contiguous run sharing a group name gets the run length, the rest
    /// of the run get the negated position inside the run.
    pub fn update_header_spans(&mut self) {
        for column in &mut self.columns {
            column.header_col_span = 0;
        }

        let visible: Vec<(usize, Option<String>)> = {
            let mut positions: Vec<usize> = (0..self.columns.len())
                .filter(|&pos| self.columns[pos].visible)
                .collect();
            positions.sort_by_key(|&pos| (self.columns[pos].order, self.columns[pos].index));
            positions
                .into_iter()
                .map(|pos| (pos, self.columns[pos].group_name.clone()))
                .collect()
        };

        let mut run_start = 0;
        while run_start < visible.len() {
            let group = &visible[run_start].1;
            let mut run_end = run_start + 1;
            while run_end < visible.len() && group.is_some() && visible[run_end].1 == *group {
                run_end += 1;
            }

            if group.is_some() {
                let span = (run_end - run_start) as i32;
                self.columns[visible[run_start].0].header_col_span = span;
                for (offset, (pos, _)) in visible[run_start + 1..run_end].iter().enumerate() {
                    self.columns[*pos].header_col_span = -(offset as i32 + 1);
                }
            }

            run_start = run_end;
        }
    }

    /// Whether `order` values form exactly `{1..N}`.
    pub fn is_order_permutation(&self) -> bool {
        let mut orders: Vec<usize> = self.columns.iter().map(|c| c.order).collect();
        orders.sort_unstable();
        orders.iter().enumerate().all(|(i, &o)| o == i + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(keys: &[&str]) -> ColumnSet {
        ColumnSet::new(
            keys.iter()
                .enumerate()
                .map(|(i, k)| ColumnState::new(*k, *k, i))
                .collect(),
        )
    }

    fn order_of(set: &ColumnSet) -> Vec<String> {
        set.ordered().iter().map(|c| c.unique_key.clone()).collect()
    }

    #[test]
    fn parse_widths() {
        assert_eq!(ColumnWidth::parse("120px"), Some(ColumnWidth::Pixels(120.0)));
        assert_eq!(ColumnWidth::parse("25%"), Some(ColumnWidth::Percent(25.0)));
        assert_eq!(ColumnWidth::parse("2fr"), Some(ColumnWidth::Fraction(2.0)));
        assert_eq!(ColumnWidth::parse("80"), Some(ColumnWidth::Pixels(80.0)));
        assert_eq!(ColumnWidth::parse("-1px"), None);
        assert_eq!(ColumnWidth::parse("wide"), None);
    }

    #[test]
    fn move_column_keeps_permutation() {
        let mut columns = set(&["a", "b", "c", "d"]);
        assert!(columns.move_column("d", 1));
        assert_eq!(order_of(&columns), ["d", "a", "b", "c"]);
        assert!(columns.is_order_permutation());

        assert!(columns.move_column("d", 99));
        assert_eq!(order_of(&columns), ["a", "b", "c", "d"]);
        assert!(columns.is_order_permutation());

        assert!(!columns.move_column("missing", 1));
    }

    #[test]
    fn reset_order_puts_hidden_last() {
        let mut columns = set(&["a", "b", "c"]);
        columns.set_visible("a", false);
        columns.move_column("c", 1);
        columns.reset_order();

        assert_eq!(order_of(&columns), ["b", "c", "a"]);
        assert!(columns.is_order_permutation());
    }

    #[test]
    fn freezing_moves_column_forward() {
        let mut columns = set(&["a", "b", "c"]);
        columns.set_frozen("c", true);
        assert_eq!(order_of(&columns), ["c", "a", "b"]);
        assert!(columns.is_order_permutation());
    }

    #[test]
    fn hiding_respects_allow_hide() {
        let mut columns = set(&["a", "b"]);
        columns.get_mut("a").unwrap().allow_hide = false;
        assert!(!columns.set_visible("a", false));
        assert!(columns.get("a").unwrap().visible);
    }

    #[test]
    fn sort_cycle_and_cap() {
        let mut columns = set(&["a", "b", "c", "d", "e"]);
        for key in ["a", "b", "c", "d", "e"] {
            columns.toggle_sort(key, true);
        }

        let sorted: Vec<_> = columns
            .iter()
            .filter(|c| c.sort_direction.is_active())
            .map(|c| (c.unique_key.as_str(), c.sorting_order))
            .collect();
        assert_eq!(
            sorted,
            vec![
                ("b", Some(1)),
                ("c", Some(2)),
                ("d", Some(3)),
                ("e", Some(4))
            ]
        );

        assert_eq!(columns.toggle_sort("c", true), Some(SortDirection::Descending));
        assert_eq!(columns.get("c").unwrap().sorting_order, Some(2));

        assert_eq!(columns.toggle_sort("c", true), Some(SortDirection::None));
        assert_eq!(columns.get("c").unwrap().sorting_order, None);
        assert_eq!(columns.get("e").unwrap().sorting_order, Some(3));
    }

    #[test]
    fn non_additive_sort_replaces_others() {
        let mut columns = set(&["a", "b"]);
        columns.toggle_sort("a", false);
        columns.toggle_sort("b", false);
        assert!(!columns.get("a").unwrap().sort_direction.is_active());
        assert_eq!(columns.get("b").unwrap().sorting_order, Some(1));
    }

    #[test]
    fn header_spans_mark_group_runs() {
        let mut columns = ColumnSet::new(vec![
            ColumnState::new("a", "a", 0),
            {
                let mut c = ColumnState::new("b", "b", 1);
                c.group_name = Some("G".into());
                c
            },
            {
                let mut c = ColumnState::new("c", "c", 2);
                c.group_name = Some("G".into());
                c
            },
            {
                let mut c = ColumnState::new("d", "d", 3);
                c.group_name = Some("G".into());
                c
            },
        ]);

        let spans: Vec<i32> = columns.ordered().iter().map(|c| c.header_col_span).collect();
        assert_eq!(spans, vec![0, 3, -1, -2]);

        columns.move_column("a", 3);
        let spans: Vec<i32> = columns.ordered().iter().map(|c| c.header_col_span).collect();
        assert_eq!(spans, vec![2, -1, 0, 1]);
    }

    #[test]
    fn blank_filter_is_dropped() {
        let mut columns = set(&["a"]);
        columns.set_filter("a", Some(ColumnFilter::Contains(" ".into())));
        assert!(columns.get("a").unwrap().filter.is_none());
    }

    #[test]
    fn calculation_respects_type() {
        let mut columns = set(&["a"]);
        assert!(!columns.set_calculation("a", CalculationType::Sum));
        assert!(columns.set_calculation("a", CalculationType::Count));
    }
}
