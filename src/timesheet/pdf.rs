//! Minimal paged PDF writer: headings, text lines and tables on A4.

use pdf_writer::{Content, Name, Pdf, Rect, Ref, Str};

pub struct PdfDocument {
    pdf: Pdf,
    catalog_id: Ref,
    pages_id: Ref,
    font_id: Ref,
    bold_font_id: Ref,
    next_id: i32,
    page_refs: Vec<Ref>,
    current: Option<(Ref, Content)>,

    title: String,
    page_w: f32,
    page_h: f32,
    margin: f32,
    row_h: f32,
    y: f32,

    font_size: f32,
    header_font_size: f32,
    title_font_size: f32,
}

impl PdfDocument {
    pub fn new(title: &str) -> Self {
        let mut pdf = Pdf::new();

        let catalog_id = Ref::new(1);
        let pages_id = Ref::new(2);
        let font_id = Ref::new(3);
        let bold_font_id = Ref::new(4);

        pdf.type1_font(font_id).base_font(Name(b"Helvetica"));
        pdf.type1_font(bold_font_id).base_font(Name(b"Helvetica-Bold"));

        Self {
            pdf,
            catalog_id,
            pages_id,
            font_id,
            bold_font_id,
            next_id: 5,
            page_refs: Vec::new(),
            current: None,

            title: pdf_text(title),
            page_w: 595.0,
            page_h: 842.0,
            margin: 50.0,
            row_h: 18.0,
            y: 0.0,

            font_size: 9.0,
            header_font_size: 10.0,
            title_font_size: 14.0,
        }
    }

    #[cfg(test)]
    pub fn page_count(&self) -> usize {
        self.page_refs.len()
    }

    fn fresh_ref(&mut self) -> Ref {
        let id = self.next_id;
        self.next_id += 1;
        Ref::new(id)
    }

    /// Close the current page (if any) and open a new one with header and footer.
    fn start_page(&mut self) {
        self.finish_page();

        let page_id = self.fresh_ref();
        let content_id = self.fresh_ref();
        self.page_refs.push(page_id);

        let mut page = self.pdf.page(page_id);
        page.parent(self.pages_id)
            .media_box(Rect::new(0.0, 0.0, self.page_w, self.page_h))
            .contents(content_id);
        let mut resources = page.resources();
        let mut fonts = resources.fonts();
        fonts.pair(Name(b"F1"), self.font_id);
        fonts.pair(Name(b"F2"), self.bold_font_id);
        drop(fonts);
        drop(resources);
        drop(page);

        let mut content = Content::new();
        let page_no = self.page_refs.len();
        self.draw_text(&mut content, b"F2", self.margin, self.page_h - self.margin + 15.0, self.title_font_size, &self.title);
        self.draw_text(
            &mut content,
            b"F1",
            self.page_w - self.margin - 40.0,
            self.margin - 35.0,
            self.font_size,
            &format!("Page {page_no}"),
        );

        self.current = Some((content_id, content));
        self.y = self.page_h - self.margin - 20.0;
    }

    fn finish_page(&mut self) {
        if let Some((id, content)) = self.current.take() {
            self.pdf.stream(id, &content.finish());
        }
    }

    /// Make sure `height` points fit below the cursor, breaking the page if not.
    fn ensure_space(&mut self, height: f32) -> bool {
        if self.current.is_none() || self.y - height < self.margin {
            self.start_page();
            return true;
        }
        false
    }

    fn with_content(&mut self, f: impl FnOnce(&Self, &mut Content)) {
        if let Some((id, mut content)) = self.current.take() {
            f(self, &mut content);
            self.current = Some((id, content));
        }
    }

    fn draw_text(&self, content: &mut Content, font: &[u8], x: f32, y: f32, size: f32, text: &str) {
        content.begin_text();
        content.set_font(Name(font), size);
        content.set_text_matrix([1.0, 0.0, 0.0, 1.0, x, y]);
        content.show(Str(text.as_bytes()));
        content.end_text();
    }

    fn draw_cell_borders(&self, content: &mut Content, x: f32, y: f32, w: f32, h: f32) {
        content.save_state();
        content.set_stroke_rgb(0.65, 0.65, 0.65);
        content.rect(x, y, w, h);
        content.stroke();
        content.restore_state();
    }

    fn fill_row(&self, content: &mut Content, y: f32, width: f32, rgb: (f32, f32, f32)) {
        content.save_state();
        content.set_fill_rgb(rgb.0, rgb.1, rgb.2);
        content.rect(self.margin, y, width, self.row_h);
        content.fill_nonzero();
        content.restore_state();
    }

    fn draw_row(&self, content: &mut Content, y: f32, col_widths: &[f32], row: &[String], font: &[u8], size: f32) {
        let mut x = self.margin;
        for (text, w) in row.iter().zip(col_widths) {
            let max_chars = ((w - 6.0) / (size * 0.5)).max(1.0) as usize;
            self.draw_text(content, font, x + 4.0, y + 5.0, size, &truncate(text, max_chars));
            self.draw_cell_borders(content, x, y, *w, self.row_h);
            x += w;
        }
    }

    /// Column widths from header and content length, scaled to the page width.
    fn compute_col_widths(&self, headers: &[&str], rows: &[Vec<String>]) -> Vec<f32> {
        let mut widths: Vec<f32> = headers.iter().map(|h| h.len() as f32 * 6.5 + 8.0).collect();
        for row in rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = (cell.len() as f32 * 5.2 + 8.0).max(widths[i]);
            }
        }

        let total: f32 = widths.iter().sum();
        let max = self.page_w - 2.0 * self.margin;
        if total > max {
            let scale = max / total;
            for w in &mut widths {
                *w *= scale;
            }
        }
        widths
    }

    pub fn heading(&mut self, text: &str) {
        self.ensure_space(self.row_h * 3.0);
        self.y -= 6.0;
        let text = pdf_text(text);
        let (y, size) = (self.y, self.header_font_size + 2.0);
        self.with_content(|doc, content| doc.draw_text(content, b"F2", doc.margin, y + 5.0, size, &text));
        self.y -= self.row_h;
    }

    pub fn line(&mut self, text: &str) {
        self.ensure_space(self.row_h);
        let text = pdf_text(text);
        let (y, size) = (self.y, self.font_size + 1.0);
        self.with_content(|doc, content| doc.draw_text(content, b"F1", doc.margin, y + 5.0, size, &text));
        self.y -= self.row_h * 0.8;
    }

    pub fn spacer(&mut self) {
        self.y -= self.row_h * 0.5;
    }

    /// A table that continues across pages, repeating the header row.
    pub fn table(&mut self, headers: &[&str], rows: &[Vec<String>]) {
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|r| r.iter().map(|c| pdf_text(c)).collect())
            .collect();
        let col_widths = self.compute_col_widths(headers, &rows);
        let header_row: Vec<String> = headers.iter().map(|h| pdf_text(h)).collect();
        let width: f32 = col_widths.iter().sum();

        self.ensure_space(self.row_h * 2.0);
        self.table_header(&col_widths, &header_row, width);

        for (i, row) in rows.iter().enumerate() {
            if self.ensure_space(self.row_h) {
                self.table_header(&col_widths, &header_row, width);
            }
            let y = self.y;
            let (widths, size) = (&col_widths, self.font_size);
            self.with_content(|doc, content| {
                if i % 2 == 0 {
                    doc.fill_row(content, y, width, (0.96, 0.96, 0.96));
                }
                doc.draw_row(content, y, widths, row, b"F1", size);
            });
            self.y -= self.row_h;
        }
        self.y -= self.row_h * 0.5;
    }

    fn table_header(&mut self, col_widths: &[f32], header_row: &[String], width: f32) {
        let (y, size) = (self.y, self.header_font_size);
        self.with_content(|doc, content| {
            doc.fill_row(content, y, width, (0.85, 0.87, 0.90));
            doc.draw_row(content, y, col_widths, header_row, b"F2", size);
        });
        self.y -= self.row_h;
    }

    /// Serialize the document.
    pub fn finish(mut self) -> Vec<u8> {
        if self.page_refs.is_empty() {
            self.start_page();
        }
        self.finish_page();

        self.pdf.catalog(self.catalog_id).pages(self.pages_id);
        let mut pages = self.pdf.pages(self.pages_id);
        pages.count(self.page_refs.len() as i32);
        pages.kids(self.page_refs.clone());
        drop(pages);

        self.pdf.finish()
    }
}

/// Helvetica without embedding only covers Latin-1; replace everything else.
pub fn pdf_text(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
        .collect()
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let keep = max_chars.saturating_sub(2);
    format!("{}..", s.chars().take(keep).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n)
            .map(|i| vec![format!("2026-10-{:02}", i % 28 + 1), "Worked".to_string(), format!("{i}.00")])
            .collect()
    }

    #[test]
    fn test_produces_pdf_bytes() {
        let mut doc = PdfDocument::new("Attendance report");
        doc.heading("Ali (100)");
        doc.line("Work days: 3");
        doc.table(&["Date", "Status", "Hours"], &rows(3));
        assert_eq!(doc.page_count(), 1);

        let bytes = doc.finish();
        assert!(bytes.starts_with(b"%PDF-"));
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("Helvetica"));
    }

    #[test]
    fn test_long_table_breaks_pages() {
        let mut doc = PdfDocument::new("Long");
        doc.table(&["Date", "Status", "Hours"], &rows(120));
        assert!(doc.page_count() >= 3);
        assert!(doc.finish().starts_with(b"%PDF-"));
    }

    #[test]
    fn test_empty_document_still_has_a_page() {
        let bytes = PdfDocument::new("Empty").finish();
        assert!(bytes.starts_with(b"%PDF-"));
    }

    #[test]
    fn test_pdf_text_replaces_non_ascii() {
        assert_eq!(pdf_text("Zoë 🚚"), "Zo? ?");
        assert_eq!(truncate("abcdefgh", 5), "abc..");
        assert_eq!(truncate("abc", 5), "abc");
    }
}
