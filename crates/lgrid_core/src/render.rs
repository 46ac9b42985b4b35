//! Declarative render instructions consumed by the rendering layer.

use indexmap::IndexMap;

use crate::{
    ColumnState, FieldProvider, GridLayout, GridRow, PageState, Pagination, SortDirection,
    Translator,
};

/// A small DOM-like node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderNode {
    pub tag: String,
    pub attributes: IndexMap<String, String>,
    pub classes: Vec<String>,
    pub style: Option<String>,
    pub text: Option<String>,
    pub children: Vec<RenderNode>,
}

impl RenderNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn div(class: &str) -> Self {
        Self::new("div").class(class)
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        if !class.is_empty() && !self.classes.contains(&class) {
            self.classes.push(class);
        }
        self
    }

    pub fn class_if(self, condition: bool, class: &str) -> Self {
        if condition { self.class(class) } else { self }
    }

    pub fn style(mut self, style: impl Into<String>) -> Self {
        let style = style.into();
        if !style.is_empty() {
            self.style = Some(style);
        }
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn child(mut self, child: RenderNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = RenderNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    /// Depth-first search for nodes carrying `class`.
    pub fn find_all(&self, class: &str) -> Vec<&RenderNode> {
        let mut found = Vec::new();
        self.collect(class, &mut found);
        found
    }

    fn collect<'a>(&'a self, class: &str, found: &mut Vec<&'a RenderNode>) {
        if self.has_class(class) {
            found.push(self);
        }
        for child in &self.children {
            child.collect(class, found);
        }
    }

    /// Text of this node and its descendants, concatenated.
    pub fn inner_text(&self) -> String {
        let mut text = self.text.clone().unwrap_or_default();
        for child in &self.children {
            text.push_str(&child.inner_text());
        }
        text
    }

    pub fn to_html(&self) -> String {
        let mut html = format!("<{}", self.tag);
        if !self.classes.is_empty() {
            html.push_str(&format!(" class=\"{}\"", escape(&self.classes.join(" "))));
        }
        if let Some(style) = &self.style {
            html.push_str(&format!(" style=\"{}\"", escape(style)));
        }
        for (name, value) in &self.attributes {
            html.push_str(&format!(" {}=\"{}\"", name, escape(value)));
        }
        html.push('>');
        if let Some(text) = &self.text {
            html.push_str(&escape(text));
        }
        for child in &self.children {
            html.push_str(&child.to_html());
        }
        html.push_str(&format!("</{}>", self.tag));
        html
    }
}

fn escape(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Everything needed to render one grid frame.
pub struct RenderInput<'a, T> {
    /// Visible columns in display order.
    pub columns: Vec<&'a ColumnState>,
    pub layout: &'a GridLayout,
    pub rows: Vec<GridRow<'a, T>>,
    pub provider: &'a dyn FieldProvider<T>,
    pub is_selected: &'a dyn Fn(&T) -> bool,
    pub selection_column: bool,
    pub group_levels: usize,
    pub page: &'a PageState,
    pub pagination: &'a Pagination,
    pub show_footer: bool,
    pub show_pager: bool,
    /// Page sizes offered by the pager, ascending.
    pub page_size_options: Vec<usize>,
    pub translator: &'a dyn Translator,
}

pub fn render_grid<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let mut grid = RenderNode::div("lg-grid")
        .attr("role", "grid")
        .style(format!(
            "grid-template-columns: {};",
            input.layout.template.to_css()
        ))
        .class_if(input.page.loading, "lg-loading");

    if input.columns.iter().any(|c| c.header_col_span != 0) {
        grid = grid.child(group_header_row(input));
    }
    grid = grid.child(header_row(input)).child(body(input));

    if input.show_footer && input.columns.iter().any(|c| c.calculation.is_active()) {
        grid = grid.child(footer_row(input));
    }
    if input.show_pager {
        grid = grid.child(pager(input));
    }
    grid
}

fn leading_cells<T>(input: &RenderInput<'_, T>, class: &str) -> Vec<RenderNode> {
    let mut cells: Vec<RenderNode> = (0..input.group_levels)
        .map(|_| RenderNode::div(class).class("lg-indent"))
        .collect();
    if input.selection_column {
        cells.push(RenderNode::div(class).class("lg-select"));
    }
    cells
}

fn column_style<T>(input: &RenderInput<'_, T>, column: &ColumnState) -> String {
    input
        .layout
        .column(&column.unique_key)
        .map(|style| style.to_css())
        .unwrap_or_default()
}

fn group_header_row<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let mut row = RenderNode::div("lg-row")
        .class("lg-group-header-row")
        .children(leading_cells(input, "lg-group-header"));

    for column in &input.columns {
        match column.header_col_span {
            span if span > 0 => {
                let label = column.group_name.clone().unwrap_or_default();
                row = row.child(
                    RenderNode::div("lg-group-header")
                        .style(format!("grid-column: span {};", span))
                        .text(input.translator.translate(&label)),
                );
            }
            0 => row = row.child(RenderNode::div("lg-group-header")),
            _ => {}
        }
    }
    row
}

fn header_row<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let mut row = RenderNode::div("lg-row")
        .class("lg-header-row")
        .children(leading_cells(input, "lg-header"));

    for column in &input.columns {
        let mut cell = RenderNode::div("lg-header")
            .attr("data-key", column.unique_key.clone())
            .style(column_style(input, column))
            .class_if(column.frozen, "lg-frozen")
            .child(
                RenderNode::new("span")
                    .class("lg-title")
                    .text(input.translator.translate(&column.title)),
            );

        match column.sort_direction {
            SortDirection::None => {}
            direction => {
                let glyph = if direction == SortDirection::Ascending {
                    "\u{25B2}"
                } else {
                    "\u{25BC}"
                };
                let order = column
                    .sorting_order
                    .map(|o| o.to_string())
                    .unwrap_or_default();
                cell = cell.child(
                    RenderNode::new("span")
                        .class("lg-sort")
                        .attr("data-order", order)
                        .text(glyph),
                );
            }
        }

        if column.has_active_filter() {
            cell = cell.child(RenderNode::new("span").class("lg-filter-active"));
        }
        row = row.child(cell);
    }
    row
}

fn body<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let mut body = RenderNode::div("lg-body").attr("role", "rowgroup");

    if input.rows.is_empty() && !input.page.loading {
        return body.child(
            RenderNode::div("lg-empty").text(input.translator.translate("No records found")),
        );
    }

    for row in &input.rows {
        let node = match row {
            GridRow::Group {
                level,
                path,
                row_count,
                collapsed,
            } => {
                let label = path
                    .last()
                    .map(|v| v.as_display_string())
                    .unwrap_or_default();
                RenderNode::div("lg-row")
                    .class("lg-group-row")
                    .class_if(*collapsed, "lg-collapsed")
                    .attr("data-level", level.to_string())
                    .style(format!("grid-column: {} / -1;", level + 1))
                    .text(format!("{} ({})", label, row_count))
            }
            GridRow::Item { index, item } => {
                let selected = (input.is_selected)(*item);
                let mut node = RenderNode::div("lg-row")
                    .class("lg-item-row")
                    .class_if(selected, "lg-selected")
                    .attr("data-index", index.to_string())
                    .children(leading_cells(input, "lg-cell"));

                for column in &input.columns {
                    let value = input.provider.value(item, &column.field);
                    node = node.child(
                        RenderNode::div("lg-cell")
                            .style(column_style(input, column))
                            .class_if(column.frozen, "lg-frozen")
                            .text(value.format_for(column.value_type, column.format.as_deref())),
                    );
                }
                node
            }
        };
        body = body.child(node);
    }
    body
}

fn footer_row<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let mut row = RenderNode::div("lg-row")
        .class("lg-footer-row")
        .children(leading_cells(input, "lg-footer"));

    for column in &input.columns {
        let mut cell = RenderNode::div("lg-footer").style(column_style(input, column));
        if column.calculation.is_active() {
            if let Some(value) = input.page.calculation(&column.unique_key) {
                cell = cell.text(format!(
                    "{}: {}",
                    input.translator.translate(column.calculation.label()),
                    value.format_for(column.value_type, column.format.as_deref())
                ));
            }
        }
        row = row.child(cell);
    }
    row
}

fn pager<T>(input: &RenderInput<'_, T>) -> RenderNode {
    let pagination = input.pagination;
    let rows_on_page = input
        .rows
        .iter()
        .filter(|r| matches!(r, GridRow::Item { .. }))
        .count();

    let summary = match (pagination.row_range(rows_on_page), pagination.row_count()) {
        (Some((start, end)), Some(total)) => format!("{}-{} / {}", start, end, total),
        (Some((start, end)), None) => format!("{}-{}", start, end),
        (None, _) => String::new(),
    };

    let mut sizes = RenderNode::new("select")
        .class("lg-page-size")
        .attr("data-action", "page-size");
    for size in &input.page_size_options {
        let mut option = RenderNode::new("option")
            .attr("value", size.to_string())
            .text(size.to_string());
        if *size == pagination.page_size() {
            option = option.attr("selected", "selected");
        }
        sizes = sizes.child(option);
    }

    RenderNode::div("lg-pager")
        .child(
            RenderNode::new("button")
                .class("lg-prev")
                .attr("data-action", "previous")
                .class_if(pagination.is_first_page(), "lg-disabled")
                .text(input.translator.translate("Previous")),
        )
        .child(
            RenderNode::new("span")
                .class("lg-page")
                .text(pagination.page().to_string()),
        )
        .child(
            RenderNode::new("button")
                .class("lg-next")
                .attr("data-action", "next")
                .class_if(pagination.is_last_page(), "lg-disabled")
                .text(input.translator.translate("Next")),
        )
        .child(sizes)
        .child(RenderNode::new("span").class("lg-summary").text(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_deduplicates_classes() {
        let node = RenderNode::div("a").class("a").class("b").class_if(false, "c");
        assert_eq!(node.classes, vec!["a", "b"]);
    }

    #[test]
    fn html_is_escaped() {
        let node = RenderNode::new("span").attr("title", "\"x\"").text("<b>&");
        assert_eq!(
            node.to_html(),
            "<span title=\"&quot;x&quot;\">&lt;b&gt;&amp;</span>"
        );
    }

    #[test]
    fn find_all_walks_children() {
        let tree = RenderNode::div("root")
            .child(RenderNode::div("cell").text("a"))
            .child(RenderNode::div("row").child(RenderNode::div("cell").text("b")));
        let cells: Vec<String> = tree.find_all("cell").iter().map(|n| n.inner_text()).collect();
        assert_eq!(cells, vec!["a", "b"]);
    }
}
