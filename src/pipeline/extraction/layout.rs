// Layout-aware text reconstruction from positioned text-show operators.
// Plain text-layer extraction follows content-stream order, which breaks
// tables and absolutely positioned forms. Here every shown string keeps its
// page coordinates, fragments are grouped into lines by baseline, and
// wide horizontal gaps become tab-separated columns. Form XObjects invoked
// with `Do` are walked too, placed through their `/Matrix` and the CTM.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::types::LayoutExtractor;
use super::ExtractionError;

/// Baselines closer than this (in points) share a line.
const LINE_TOLERANCE_PT: f32 = 3.0;

/// Gap between fragments, in multiples of the font size, read as a new column.
const COLUMN_GAP_EM: f32 = 1.5;

/// Approximate glyph advance as a fraction of the font size.
const GLYPH_WIDTH_EM: f32 = 0.5;

/// TJ adjustment (thousandths of an em) treated as a word space.
const TJ_SPACE_THRESHOLD: f32 = -200.0;

/// Deepest chain of forms invoking forms that is followed.
const MAX_FORM_DEPTH: usize = 12;

/// Ancestors searched for inherited page resources.
const MAX_PAGE_TREE_DEPTH: usize = 32;

/// PDF affine matrix `[a b c d e f]`.
type Matrix = [f32; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// `first` followed by `then`.
fn concat(first: &Matrix, then: &Matrix) -> Matrix {
    [
        first[0] * then[0] + first[1] * then[2],
        first[0] * then[1] + first[1] * then[3],
        first[2] * then[0] + first[3] * then[2],
        first[2] * then[1] + first[3] * then[3],
        first[4] * then[0] + first[5] * then[2] + then[4],
        first[4] * then[1] + first[5] * then[3] + then[5],
    ]
}

fn transform(m: &Matrix, x: f32, y: f32) -> (f32, f32) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

/// Horizontal scale factor; 1 for degenerate matrices.
fn scale_of(m: &Matrix) -> f32 {
    let scale = (m[0] * m[0] + m[1] * m[1]).sqrt();
    if scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn matrix_from(values: &[Object]) -> Option<Matrix> {
    if values.len() != 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, value) in m.iter_mut().zip(values) {
        *slot = number(value)?;
    }
    Some(m)
}

#[derive(Debug, Clone, PartialEq)]
struct Fragment {
    x: f32,
    y: f32,
    end_x: f32,
    font_size: f32,
    text: String,
}

/// Text state tracked while walking a content stream.
#[derive(Debug, Clone)]
struct TextCursor {
    line_x: f32,
    line_y: f32,
    x: f32,
    y: f32,
    scale_x: f32,
    scale_y: f32,
    font_size: f32,
    leading: f32,
}

impl Default for TextCursor {
    fn default() -> Self {
        Self {
            line_x: 0.0,
            line_y: 0.0,
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            font_size: 12.0,
            leading: 0.0,
        }
    }
}

impl TextCursor {
    /// Fresh text matrices, keeping font size and leading.
    fn restarted(&self) -> Self {
        Self {
            font_size: self.font_size,
            leading: self.leading,
            ..Self::default()
        }
    }

    fn begin_text(&mut self) {
        *self = self.restarted();
    }

    fn move_line(&mut self, tx: f32, ty: f32) {
        self.line_x += tx * self.scale_x;
        self.line_y += ty * self.scale_y;
        self.x = self.line_x;
        self.y = self.line_y;
    }

    fn next_line(&mut self) {
        self.move_line(0.0, -self.leading);
    }

    fn set_matrix(&mut self, m: Matrix) {
        self.scale_x = if m[0] == 0.0 { 1.0 } else { m[0].abs() };
        self.scale_y = if m[3] == 0.0 { 1.0 } else { m[3].abs() };
        self.line_x = m[4];
        self.line_y = m[5];
        self.x = m[4];
        self.y = m[5];
    }

    fn effective_size(&self) -> f32 {
        (self.font_size * self.scale_x).max(1.0)
    }

    /// Advance past `text`, returning it placed in page space.
    fn show(&mut self, text: String, ctm: &Matrix) -> Option<Fragment> {
        let size = self.effective_size();
        let advance = text.chars().count() as f32 * size * GLYPH_WIDTH_EM;
        let (x, y) = transform(ctm, self.x, self.y);
        self.x += advance;

        if text.is_empty() {
            return None;
        }
        let scale = scale_of(ctm);
        Some(Fragment {
            x,
            y,
            end_x: x + advance * scale,
            font_size: size * scale,
            text,
        })
    }
}

/// Reconstructs page text from glyph positions in the content stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalLayoutExtractor;

impl LayoutExtractor for PositionalLayoutExtractor {
    fn extract_pages(&self, pdf_bytes: &[u8]) -> Result<Vec<String>, ExtractionError> {
        let doc = Document::load_mem(pdf_bytes)?;
        let mut pages = Vec::new();

        for (number, page_id) in doc.get_pages() {
            let fragments = FragmentWalker::page(&doc, page_id, Scope::Everything)?;
            debug!(page = number, fragments = fragments.len(), "Layout fragments collected");
            pages.push(assemble_lines(fragments));
        }

        Ok(pages)
    }
}

/// Text drawn by the form XObjects a page invokes, laid out as lines.
/// Text shown directly in the page's own content stream is left out.
pub(crate) fn form_xobject_text(
    doc: &Document,
    page_id: ObjectId,
) -> Result<String, ExtractionError> {
    Ok(assemble_lines(FragmentWalker::page(doc, page_id, Scope::FormsOnly)?))
}

/// Which shown strings become fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Everything,
    FormsOnly,
}

struct FragmentWalker<'a> {
    doc: &'a Document,
    scope: Scope,
    /// Forms being walked, outermost first.
    open_forms: Vec<ObjectId>,
    fragments: Vec<Fragment>,
}

impl<'a> FragmentWalker<'a> {
    fn page(doc: &'a Document, page_id: ObjectId, scope: Scope) -> Result<Vec<Fragment>, ExtractionError> {
        let content = Content::decode(&doc.get_page_content(page_id)?)?;
        let mut walker = Self {
            doc,
            scope,
            open_forms: Vec::new(),
            fragments: Vec::new(),
        };
        walker.walk(
            &content.operations,
            page_resources(doc, page_id),
            IDENTITY,
            TextCursor::default(),
        );
        Ok(walker.fragments)
    }

    fn emit(&mut self, cursor: &mut TextCursor, text: String, ctm: &Matrix) {
        let fragment = cursor.show(text, ctm);
        if self.scope == Scope::Everything || !self.open_forms.is_empty() {
            self.fragments.extend(fragment);
        }
    }

    fn walk(
        &mut self,
        operations: &[Operation],
        resources: Option<&'a Dictionary>,
        mut ctm: Matrix,
        mut cursor: TextCursor,
    ) {
        let mut saved: Vec<Matrix> = Vec::new();

        for op in operations {
            match op.operator.as_str() {
                "q" => saved.push(ctm),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        ctm = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = matrix_from(&op.operands) {
                        ctm = concat(&m, &ctm);
                    }
                }
                "Do" => {
                    if let Some(name) = op.operands.first().and_then(|o| o.as_name().ok()) {
                        self.invoke_form(name, resources, &ctm, &cursor);
                    }
                }
                "BT" => cursor.begin_text(),
                "Tf" => cursor.font_size = operand(op, 1).abs().max(1.0),
                "TL" => cursor.leading = operand(op, 0),
                "Td" => cursor.move_line(operand(op, 0), operand(op, 1)),
                "TD" => {
                    cursor.leading = -operand(op, 1);
                    cursor.move_line(operand(op, 0), operand(op, 1));
                }
                "Tm" => {
                    let mut m = [0.0f32; 6];
                    for (i, slot) in m.iter_mut().enumerate() {
                        *slot = operand(op, i);
                    }
                    cursor.set_matrix(m);
                }
                "T*" => cursor.next_line(),
                "Tj" => {
                    if let Some(text) = op.operands.first().and_then(string_operand) {
                        self.emit(&mut cursor, text, &ctm);
                    }
                }
                "'" => {
                    cursor.next_line();
                    if let Some(text) = op.operands.first().and_then(string_operand) {
                        self.emit(&mut cursor, text, &ctm);
                    }
                }
                "\"" => {
                    cursor.next_line();
                    if let Some(text) = op.operands.get(2).and_then(string_operand) {
                        self.emit(&mut cursor, text, &ctm);
                    }
                }
                "TJ" => {
                    if let Some(Object::Array(items)) = op.operands.first() {
                        self.emit(&mut cursor, tj_array_text(items), &ctm);
                    }
                }
                _ => {}
            }
        }
    }

    /// Walk the form XObject `name`, unless it is already open further up
    /// the chain or the chain is too deep. Image XObjects are skipped.
    fn invoke_form(
        &mut self,
        name: &[u8],
        resources: Option<&'a Dictionary>,
        ctm: &Matrix,
        cursor: &TextCursor,
    ) {
        let Some((form_id, form)) = resources.and_then(|r| lookup_form(self.doc, r, name)) else {
            return;
        };
        if self.open_forms.contains(&form_id) || self.open_forms.len() >= MAX_FORM_DEPTH {
            debug!(form = ?form_id, depth = self.open_forms.len(), "Form XObject not followed");
            return;
        }

        let data = form
            .decompressed_content()
            .unwrap_or_else(|_| form.content.clone());
        let content = match Content::decode(&data) {
            Ok(content) => content,
            Err(e) => {
                debug!(form = ?form_id, error = %e, "Undecodable form XObject skipped");
                return;
            }
        };

        let matrix = form
            .dict
            .get(b"Matrix")
            .and_then(Object::as_array)
            .ok()
            .and_then(|values| matrix_from(values))
            .unwrap_or(IDENTITY);
        let form_resources = form
            .dict
            .get_deref(b"Resources", self.doc)
            .and_then(Object::as_dict)
            .ok()
            .or(resources);

        self.open_forms.push(form_id);
        self.walk(
            &content.operations,
            form_resources,
            concat(&matrix, ctm),
            cursor.restarted(),
        );
        self.open_forms.pop();
    }
}

/// Resources of a page, inherited from the page tree when the page has none.
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = doc.get_dictionary(page_id).ok();
    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let dict = node?;
        if let Ok(resources) = dict.get_deref(b"Resources", doc).and_then(Object::as_dict) {
            return Some(resources);
        }
        node = dict.get_deref(b"Parent", doc).and_then(Object::as_dict).ok();
    }
    None
}

fn lookup_form<'a>(
    doc: &'a Document,
    resources: &'a Dictionary,
    name: &[u8],
) -> Option<(ObjectId, &'a Stream)> {
    let xobjects = resources
        .get_deref(b"XObject", doc)
        .and_then(Object::as_dict)
        .ok()?;
    let (id, object) = doc.dereference(xobjects.get(name).ok()?).ok()?;
    let stream = object.as_stream().ok()?;
    let subtype = stream.dict.get(b"Subtype").and_then(Object::as_name).ok();
    if subtype != Some(b"Form".as_slice()) {
        return None;
    }
    Some((id?, stream))
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn operand(op: &Operation, index: usize) -> f32 {
    op.operands.get(index).and_then(number).unwrap_or(0.0)
}

/// Decode a PDF string operand. UTF-16BE when it carries a byte-order
/// mark, otherwise bytes map one-to-one onto Latin-1.
fn decode_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn string_operand(obj: &Object) -> Option<String> {
    match obj {
        Object::String(bytes, _) => Some(decode_string(bytes)),
        _ => None,
    }
}

fn tj_array_text(items: &[Object]) -> String {
    let mut text = String::new();
    for item in items {
        if let Some(s) = string_operand(item) {
            text.push_str(&s);
        } else if let Some(adjust) = number(item) {
            if adjust < TJ_SPACE_THRESHOLD && !text.ends_with(' ') {
                text.push(' ');
            }
        }
    }
    text
}

/// Group fragments into top-to-bottom lines, left-to-right within a line.
fn assemble_lines(mut fragments: Vec<Fragment>) -> String {
    fragments.sort_by(|a, b| b.y.total_cmp(&a.y).then(a.x.total_cmp(&b.x)));

    let mut lines: Vec<Vec<Fragment>> = Vec::new();
    for fragment in fragments {
        match lines.last_mut() {
            Some(line) if (line[0].y - fragment.y).abs() <= LINE_TOLERANCE_PT => {
                line.push(fragment)
            }
            _ => lines.push(vec![fragment]),
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x.total_cmp(&b.x));
            render_line(&line)
        })
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_line(line: &[Fragment]) -> String {
    let mut out = String::new();
    let mut prev_end: Option<f32> = None;

    for fragment in line {
        if let Some(end) = prev_end {
            let gap = fragment.x - end;
            if gap > fragment.font_size * COLUMN_GAP_EM {
                out.push('\t');
            } else if gap > fragment.font_size * GLYPH_WIDTH_EM * 0.5
                && !out.ends_with(' ')
                && !fragment.text.starts_with(' ')
            {
                out.push(' ');
            }
        }
        out.push_str(&fragment.text);
        prev_end = Some(fragment.end_x);
    }

    out.trim_end().to_string()
}
