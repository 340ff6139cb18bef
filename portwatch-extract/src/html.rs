//! Cell-text extraction over a parsed HTML document.
//!
//! Elements are matched by tag name while walking the tree in document order,
//! which is all the two source layouts need.

use scraper::{ElementRef, Html};

/// Ordered, trimmed text cells of one table row.
pub type RawRow = Vec<String>;

/// A section heading and the first table that follows it in document order.
#[derive(Debug)]
pub struct HeadedTable<'a> {
    pub heading: String,
    pub table: Option<ElementRef<'a>>,
}

fn elements_named<'a>(
    root: ElementRef<'a>,
    name: &'a str,
) -> impl Iterator<Item = ElementRef<'a>> + 'a {
    root.descendants()
        .filter_map(ElementRef::wrap)
        .filter(move |el| el.value().name() == name)
}

/// Text of an element and its descendants: every text node trimmed, empty
/// nodes dropped, the rest concatenated without a separator.
pub fn cell_text(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Trimmed text of every `<td>` in a row.
pub fn row_cells(row: ElementRef<'_>) -> RawRow {
    elements_named(row, "td").map(cell_text).collect()
}

/// All rows of a table except the first (header) row.
pub fn data_rows(table: ElementRef<'_>) -> Vec<RawRow> {
    elements_named(table, "tr").skip(1).map(row_cells).collect()
}

pub fn first_table(doc: &Html) -> Option<ElementRef<'_>> {
    elements_named(doc.root_element(), "table").next()
}

/// Data rows of the first table on the page, `None` when the page has no table.
pub fn first_table_rows(body: &str) -> Option<Vec<RawRow>> {
    let doc = Html::parse_document(body);
    first_table(&doc).map(data_rows)
}

/// Every `heading_tag` element paired with the nearest `<table>` after it.
///
/// Consecutive headings with no table in between share the same following
/// table; a heading after the last table gets `None`.
pub fn headed_tables<'a>(doc: &'a Html, heading_tag: &str) -> Vec<HeadedTable<'a>> {
    let mut out: Vec<HeadedTable<'a>> = Vec::new();
    let mut waiting: Vec<usize> = Vec::new();

    for el in doc.root_element().descendants().filter_map(ElementRef::wrap) {
        let name = el.value().name();
        if name == heading_tag {
            waiting.push(out.len());
            out.push(HeadedTable {
                heading: cell_text(el),
                table: None,
            });
        } else if name == "table" {
            for idx in waiting.drain(..) {
                out[idx].table = Some(el);
            }
        }
    }
    out
}
