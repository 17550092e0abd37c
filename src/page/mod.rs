//! In-memory model of the rendered page.
//!
//! Only the parts the pipeline reads or writes are kept: the tables of the
//! content region, their rows and cells, a cell's first link, the marker
//! classes set on a cell and the annotations rendered into it.

pub mod html;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid content selector '{0}'")]
    Selector(String),
}

/// Everything rendered into a cell by the diff pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// Signed delta label, e.g. `[+3]`.
    Delta(String),
    /// Former name of a renamed player, e.g. `aka: Alpha`.
    FormerName(String),
}

impl Annotation {
    pub fn text(&self) -> &str {
        match self {
            Annotation::Delta(text) | Annotation::FormerName(text) => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub header: bool,
    /// Text of the cell as rendered by the page, annotations excluded.
    pub text: String,
    pub link: Option<Link>,
    pub classes: Vec<String>,
    pub annotations: Vec<Annotation>,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Cell {
            text: text.into(),
            ..Cell::default()
        }
    }

    pub fn header(text: impl Into<String>) -> Self {
        Cell {
            header: true,
            ..Cell::new(text)
        }
    }

    pub fn with_link(mut self, href: impl Into<String>) -> Self {
        self.link = Some(Link {
            href: href.into(),
            text: self.text.clone(),
        });
        self
    }

    /// Full text content, annotations included, the way a browser's
    /// `textContent` would report it.
    pub fn text_content(&self) -> String {
        let mut out = self.text.clone();
        for annotation in &self.annotations {
            out.push_str(annotation.text());
        }
        out
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.classes.push(class.to_string());
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        self.classes.retain(|c| c != class);
    }

    pub fn push_annotation(&mut self, annotation: Annotation) {
        self.annotations.push(annotation);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Row { cells }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(rows: Vec<Row>) -> Self {
        Table { rows }
    }

    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.rows.iter_mut().flat_map(|row| row.cells.iter_mut())
    }

    pub fn cell_mut(&mut self, row: usize, col: usize) -> Option<&mut Cell> {
        self.rows.get_mut(row)?.cells.get_mut(col)
    }
}

/// Page the model was parsed from. Rendering splices the model back into it
/// so everything outside the ranking cells is written out unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Markup {
    pub html: String,
    pub content_selector: String,
}

/// Tables of the content region, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub tables: Vec<Table>,
    pub diffs_hidden: bool,
    /// `None` for documents built in code; those render as a bare page.
    pub markup: Option<Markup>,
}

impl Document {
    pub fn new(tables: Vec<Table>) -> Self {
        Document {
            tables,
            diffs_hidden: false,
            markup: None,
        }
    }
}
