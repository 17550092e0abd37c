//! HTML in and out of the page model.
//!
//! Parsing keeps only the tables inside the content region. Annotation spans
//! written by [`render`] are recognised on the way back in, so an annotated
//! page can be re-read and re-annotated without the labels leaking into cell
//! text.
//!
//! Rendering re-serializes the page the document was parsed from and only
//! touches the ranking cells, the root class and the injected stylesheet.

use std::collections::HashMap;

use scraper::node::{Element, Node};
use scraper::{CaseSensitivity, ElementRef, Html, Selector};
use tracing::{debug, warn};

use super::{Annotation, Cell, Document, Link, Markup, PageError, Row, Table};

pub const DIFF_CLASS: &str = "rs-diff";
pub const AKA_CLASS: &str = "rs-aka";
pub const HIDE_DIFFS_CLASS: &str = "rs-hide-diffs";
pub const STYLE_ID: &str = "rs-style";

const STYLESHEET: &str = "
.rs-diff { display:block; font-size:11px; margin-top:2px; opacity:.95 }
.rs-aka { display:block; font-size:11px; color:#bbb; margin-top:2px }
td.delta-pos, th.delta-pos, td.rank-pos, th.rank-pos { background:rgba(46,160,67,.18) }
td.delta-zero, th.delta-zero, td.rank-zero, th.rank-zero { background:rgba(255,167,38,.18) }
td.delta-neg, th.delta-neg, td.rank-neg, th.rank-neg { background:rgba(244,67,54,.18) }
.delta-pos .rs-diff, .rank-pos .rs-diff { color:#2ea043 }
.delta-zero .rs-diff, .rank-zero .rs-diff { color:#ff9800 }
.delta-neg .rs-diff, .rank-neg .rs-diff { color:#f44336 }
.rs-hide-diffs .rs-diff, .rs-hide-diffs .rs-aka { display:none }
";

const VOID_ELEMENTS: [&str; 15] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta", "param",
    "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: [&str; 8] = [
    "iframe", "noembed", "noframes", "noscript", "plaintext", "script", "style", "xmp",
];

/// Parse a page, keeping the tables under `content_selector`.
///
/// When the selector matches nothing the whole document is scanned instead.
pub fn parse(source: &str, content_selector: &str) -> Result<Document, PageError> {
    let html = Html::parse_document(source);

    let tables: Vec<Table> = table_cells(&html, content_selector)?
        .into_iter()
        .map(|rows| Table {
            rows: rows
                .into_iter()
                .map(|cells| Row {
                    cells: cells.into_iter().map(parse_cell).collect(),
                })
                .collect(),
        })
        .collect();
    let diffs_hidden = html
        .root_element()
        .value()
        .classes()
        .any(|c| c == HIDE_DIFFS_CLASS);

    debug!(tables = tables.len(), "parsed page");
    Ok(Document {
        tables,
        diffs_hidden,
        markup: Some(Markup {
            html: source.to_string(),
            content_selector: content_selector.to_string(),
        }),
    })
}

fn selector(css: &str) -> Result<Selector, PageError> {
    Selector::parse(css).map_err(|e| PageError::Selector(format!("{css}: {e}")))
}

/// Cell elements of every table in the content region, as tables of rows.
/// Parsing and rendering both walk the page through here, so model cells and
/// source cells line up by position.
fn table_cells<'a>(
    html: &'a Html,
    content_selector: &str,
) -> Result<Vec<Vec<Vec<ElementRef<'a>>>>, PageError> {
    let region_selector = selector(content_selector)?;
    let table_selector = selector("table")?;

    let region = match html.select(&region_selector).next() {
        Some(region) => region,
        None => {
            debug!(selector = content_selector, "content region not found, scanning whole document");
            html.root_element()
        }
    };

    Ok(region.select(&table_selector).map(table_rows).collect())
}

// rows of the table itself and of its thead/tbody/tfoot sections, not of nested tables
fn table_rows(table: ElementRef<'_>) -> Vec<Vec<ElementRef<'_>>> {
    let mut rows = Vec::new();

    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(row_cells(child)),
            "thead" | "tbody" | "tfoot" => {
                for tr in child.children().filter_map(ElementRef::wrap) {
                    if tr.value().name() == "tr" {
                        rows.push(row_cells(tr));
                    }
                }
            }
            _ => {}
        }
    }

    rows
}

fn row_cells(tr: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    tr.children()
        .filter_map(ElementRef::wrap)
        .filter(|el| matches!(el.value().name(), "td" | "th"))
        .collect()
}

fn parse_cell(el: ElementRef) -> Cell {
    let mut raw = String::new();
    let mut annotations = Vec::new();
    collect_text(el, &mut raw, &mut annotations);

    let link = el
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|d| d.value().name() == "a")
        .map(|a| {
            let mut text = String::new();
            collect_text(a, &mut text, &mut Vec::new());
            Link {
                href: a.value().attr("href").unwrap_or_default().to_string(),
                text: normalize_ws(&text),
            }
        });

    Cell {
        header: el.value().name() == "th",
        text: normalize_ws(&raw),
        link,
        classes: el.value().classes().map(str::to_string).collect(),
        annotations,
    }
}

fn annotation_of(el: ElementRef) -> Option<Annotation> {
    let element = el.value();
    if element.has_class(DIFF_CLASS, CaseSensitivity::CaseSensitive) {
        Some(Annotation::Delta(element_text(el)))
    } else if element.has_class(AKA_CLASS, CaseSensitivity::CaseSensitive) {
        Some(Annotation::FormerName(element_text(el)))
    } else {
        None
    }
}

fn collect_text(el: ElementRef, out: &mut String, annotations: &mut Vec<Annotation>) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                let Some(child_el) = ElementRef::wrap(child) else { continue };
                match annotation_of(child_el) {
                    Some(annotation) => annotations.push(annotation),
                    None => collect_text(child_el, out, annotations),
                }
            }
            _ => {}
        }
    }
}

fn element_text(el: ElementRef) -> String {
    normalize_ws(&el.text().collect::<String>())
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Render the document as HTML.
///
/// A parsed document is written back as its source page with the cell
/// annotations, marker classes, root class and stylesheet replaced. A
/// document built in code is written as a bare page holding its tables inside
/// `<div id="content">`.
pub fn render(doc: &Document) -> String {
    match &doc.markup {
        Some(markup) => render_markup(doc, markup).unwrap_or_else(|e| {
            warn!(error = %e, "source page no longer parses, rendering tables only");
            render_standalone(doc)
        }),
        None => render_standalone(doc),
    }
}

fn render_markup(doc: &Document, markup: &Markup) -> Result<String, PageError> {
    let html = Html::parse_document(&markup.html);

    let mut cells = HashMap::new();
    for (table, source_rows) in doc.tables.iter().zip(table_cells(&html, &markup.content_selector)?) {
        for (row, source_cells) in table.rows.iter().zip(source_rows) {
            for (cell, el) in row.cells.iter().zip(source_cells) {
                cells.insert(node_key(el), cell);
            }
        }
    }

    let splice = Splice {
        cells,
        diffs_hidden: doc.diffs_hidden,
    };
    let mut out = String::with_capacity(markup.html.len() + STYLESHEET.len() + 64 * splice.cells.len());

    for child in html.tree.root().children() {
        match child.value() {
            Node::Doctype(doctype) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(doctype.name());
                out.push_str(">\n");
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Element(_) => {
                if let Some(el) = ElementRef::wrap(child) {
                    splice.element(el, &mut out);
                }
            }
            _ => {}
        }
    }

    Ok(out)
}

// the tree is not mutated while rendering, so element addresses are stable keys
fn node_key(el: ElementRef) -> *const Element {
    el.value()
}

/// Model cells keyed by the source element they were parsed from.
struct Splice<'d> {
    cells: HashMap<*const Element, &'d Cell>,
    diffs_hidden: bool,
}

impl Splice<'_> {
    fn element(&self, el: ElementRef, out: &mut String) {
        let element = el.value();
        let name = element.name();

        // re-injected at the end of <head>
        if name == "style" && element.id() == Some(STYLE_ID) {
            return;
        }

        let cell = self.cells.get(&node_key(el)).copied();
        let class = match cell {
            Some(cell) => Some(cell.classes.join(" ")),
            None if name == "html" => Some(root_class(element, self.diffs_hidden)),
            None => None,
        };

        write_start_tag(element, class.as_deref(), out);
        if VOID_ELEMENTS.contains(&name) {
            return;
        }

        let raw = RAW_TEXT_ELEMENTS.contains(&name);
        for child in el.children() {
            match child.value() {
                Node::Text(text) if raw => out.push_str(text),
                Node::Text(text) => out.push_str(&escape(text, false)),
                Node::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(comment);
                    out.push_str("-->");
                }
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else { continue };
                    // previous labels are replaced by the model's
                    if cell.is_some() && annotation_of(child_el).is_some() {
                        continue;
                    }
                    self.element(child_el, out);
                }
                _ => {}
            }
        }

        if let Some(cell) = cell {
            write_annotations(cell, out);
        }
        if name == "head" {
            write_stylesheet(out);
        }

        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
}

fn root_class(element: &Element, diffs_hidden: bool) -> String {
    let mut classes: Vec<&str> = element.classes().filter(|c| *c != HIDE_DIFFS_CLASS).collect();
    if diffs_hidden {
        classes.push(HIDE_DIFFS_CLASS);
    }
    classes.join(" ")
}

/// Start tag with the original attributes. `class` replaces the class
/// attribute; an empty replacement drops it.
fn write_start_tag(element: &Element, class: Option<&str>, out: &mut String) {
    out.push('<');
    out.push_str(element.name());

    let mut class_written = false;
    for (name, value) in element.attrs() {
        if name == "class" {
            if let Some(class) = class {
                class_written = true;
                if !class.is_empty() {
                    write_attr("class", class, out);
                }
                continue;
            }
        }
        write_attr(name, value, out);
    }

    if let Some(class) = class {
        if !class_written && !class.is_empty() {
            write_attr("class", class, out);
        }
    }

    out.push('>');
}

fn write_attr(name: &str, value: &str, out: &mut String) {
    out.push(' ');
    out.push_str(name);
    out.push_str("=\"");
    out.push_str(&escape(value, true));
    out.push('"');
}

fn write_annotations(cell: &Cell, out: &mut String) {
    for annotation in &cell.annotations {
        let class = match annotation {
            Annotation::Delta(_) => DIFF_CLASS,
            Annotation::FormerName(_) => AKA_CLASS,
        };
        out.push_str(&format!(
            "<span class=\"{class}\">{}</span>",
            escape(annotation.text(), false)
        ));
    }
}

fn write_stylesheet(out: &mut String) {
    out.push_str(&format!("<style id=\"{STYLE_ID}\">"));
    out.push_str(STYLESHEET);
    out.push_str("</style>");
}

fn render_standalone(doc: &Document) -> String {
    let mut out = String::new();
    let root_class = if doc.diffs_hidden {
        format!(" class=\"{HIDE_DIFFS_CLASS}\"")
    } else {
        String::new()
    };

    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!("<html{root_class}><head><meta charset=\"utf-8\">"));
    out.push_str("<title>rankscan</title>");
    write_stylesheet(&mut out);
    out.push_str("</head>\n<body>\n<div id=\"content\">\n");

    for table in &doc.tables {
        out.push_str("<table>\n");
        for row in &table.rows {
            out.push_str("<tr>");
            for cell in &row.cells {
                render_cell(cell, &mut out);
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }

    out.push_str("</div>\n</body>\n</html>\n");
    out
}

fn render_cell(cell: &Cell, out: &mut String) {
    let tag = if cell.header { "th" } else { "td" };

    out.push('<');
    out.push_str(tag);
    if !cell.classes.is_empty() {
        write_attr("class", &cell.classes.join(" "), out);
    }
    out.push('>');

    match &cell.link {
        Some(link) => {
            let anchor = format!(
                "<a href=\"{}\">{}</a>",
                escape(&link.href, true),
                escape(&link.text, false)
            );
            match cell.text.find(&link.text) {
                Some(at) if !link.text.is_empty() => {
                    out.push_str(&escape(&cell.text[..at], false));
                    out.push_str(&anchor);
                    out.push_str(&escape(&cell.text[at + link.text.len()..], false));
                }
                _ => {
                    out.push_str(&escape(&cell.text, false));
                    out.push_str(&anchor);
                }
            }
        }
        None => out.push_str(&escape(&cell.text, false)),
    }

    write_annotations(cell, out);

    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn escape(s: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            '"' if attribute => out.push_str("&quot;"),
            '<' if !attribute => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
        <div id="nav"><table><tr><td>menu</td></tr></table></div>
        <div id="content">
          <table>
            <thead><tr><th>#</th><th>Nombre</th><th>Puntos</th></tr></thead>
            <tbody>
              <tr><td>1</td><td><a href="/public/mob/jugador?id=42">Alpha</a></td><td>1.234</td></tr>
              <tr><td>2</td><td>  Beta &amp; Co </td><td>900</td></tr>
            </tbody>
          </table>
        </div>
        </body></html>"#;

    #[test]
    fn reads_only_the_content_region() {
        let doc = parse(PAGE, "#content").unwrap();
        assert_eq!(doc.tables.len(), 1);

        let table = &doc.tables[0];
        assert_eq!(table.rows.len(), 3);
        assert!(table.rows[0].cells[0].header);
        assert_eq!(table.rows[0].cells[1].text, "Nombre");

        let name = &table.rows[1].cells[1];
        assert_eq!(name.text, "Alpha");
        let link = name.link.as_ref().unwrap();
        assert_eq!(link.href, "/public/mob/jugador?id=42");
        assert_eq!(link.text, "Alpha");

        assert_eq!(table.rows[2].cells[1].text, "Beta & Co");
        assert!(table.rows[2].cells[1].link.is_none());
    }

    #[test]
    fn missing_region_falls_back_to_whole_document() {
        let doc = parse(PAGE, "#missing").unwrap();
        assert_eq!(doc.tables.len(), 2);
    }

    #[test]
    fn invalid_selector_is_an_error() {
        assert!(matches!(parse(PAGE, "[[["), Err(PageError::Selector(_))));
    }

    #[test]
    fn rendered_annotations_are_read_back_as_annotations() {
        let mut doc = parse(PAGE, "#content").unwrap();
        {
            let cell = doc.tables[0].cell_mut(1, 2).unwrap();
            cell.push_annotation(Annotation::Delta("[+34]".into()));
            cell.add_class("delta-pos");
        }
        doc.tables[0]
            .cell_mut(1, 1)
            .unwrap()
            .push_annotation(Annotation::FormerName("aka: Omega".into()));
        doc.diffs_hidden = true;

        let reparsed = parse(&render(&doc), "#content").unwrap();
        assert_eq!(reparsed.tables, doc.tables);
        assert!(reparsed.diffs_hidden);
    }

    #[test]
    fn render_keeps_everything_outside_the_annotated_cells() {
        let page = r#"<!DOCTYPE html>
            <html class="dark"><head><title>Ranking</title><script>if (a < b) { go(); }</script></head>
            <body>
            <div id="nav">NAVIGATION</div>
            <div id="content">
              <p class="intro">Clasificaci&oacute;n</p>
              <table>
                <tr><th>#</th><th>Nombre</th><th>Puntos</th></tr>
                <tr><td class="odd">1</td><td><a href="jugador?id=1&amp;x=2">Alpha</a> <a href="familia?id=9">[FAM]</a></td><td>10</td></tr>
                <tr><td colspan="3">&lt;&lt; anterior</td></tr>
              </table>
            </div>
            </body></html>"#;

        let mut doc = parse(page, "#content").unwrap();
        {
            let cell = doc.tables[0].cell_mut(1, 0).unwrap();
            cell.add_class("rank-zero");
            cell.push_annotation(Annotation::Delta("[0]".into()));
        }
        let out = render(&doc);

        assert!(out.contains(r#"<div id="nav">NAVIGATION</div>"#));
        assert!(out.contains(r#"<p class="intro">Clasificación</p>"#));
        assert!(out.contains(r#"<td colspan="3">&lt;&lt; anterior</td>"#));
        assert!(out.contains(r#"<a href="familia?id=9">[FAM]</a>"#));
        assert!(out.contains(r#"href="jugador?id=1&amp;x=2""#));
        assert!(out.contains("if (a < b) { go(); }"));
        assert!(out.contains(r#"<html class="dark">"#));
        assert!(out.contains(r#"<td class="odd rank-zero">1<span class="rs-diff">[0]</span></td>"#));
        assert_eq!(out.matches(STYLE_ID).count(), 1);

        // a second pass over the output replaces, never duplicates
        let again = render(&parse(&out, "#content").unwrap());
        assert_eq!(again, out);
    }

    #[test]
    fn cleared_cells_lose_their_rendered_labels() {
        let mut doc = parse(PAGE, "#content").unwrap();
        {
            let cell = doc.tables[0].cell_mut(1, 2).unwrap();
            cell.add_class("delta-pos");
            cell.push_annotation(Annotation::Delta("[+34]".into()));
        }
        let annotated = render(&doc);

        let mut doc = parse(&annotated, "#content").unwrap();
        let cell = doc.tables[0].cell_mut(1, 2).unwrap();
        cell.annotations.clear();
        cell.remove_class("delta-pos");
        let out = render(&doc);

        assert!(!out.contains("[+34]"));
        assert!(!out.contains("delta-pos\""));
        assert!(out.contains("<td>1.234</td>"));
    }

    #[test]
    fn documents_without_markup_render_standalone() {
        let doc = Document::new(vec![Table::new(vec![Row::new(vec![Cell::new("a < b")])])]);
        let out = render(&doc);
        assert!(out.contains("<div id=\"content\">"));
        assert!(out.contains("<td>a &lt; b</td>"));

        let reparsed = parse(&out, "#content").unwrap();
        assert_eq!(reparsed.tables, doc.tables);
    }
}
