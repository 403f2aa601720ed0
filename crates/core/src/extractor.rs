use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        if pages.is_empty() {
            return Err(IngestError::EmptyDocument(path.display().to_string()));
        }

        Ok(pages)
    }
}

/// Non-empty pages of one document, in page order.
pub fn extract_page_texts(path: &Path) -> Result<Vec<PageText>, IngestError> {
    LopdfExtractor.extract_pages(path)
}

/// All page texts of one document as a single string, in page order.
pub fn extract_document_text(path: &Path) -> Result<String, IngestError> {
    let pages = extract_page_texts(path)?;
    Ok(join_pages(&pages))
}

pub fn extract_document_text_with<X: PdfExtractor + ?Sized>(
    extractor: &X,
    path: &Path,
) -> Result<String, IngestError> {
    let pages = extractor.extract_pages(path)?;
    Ok(join_pages(&pages))
}

// Newline-joined so words at page boundaries stay separate.
fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    struct FixedPages(Vec<PageText>);

    impl PdfExtractor for FixedPages {
        fn extract_pages(&self, _path: &Path) -> Result<Vec<PageText>, IngestError> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn pages_are_concatenated_in_order() {
        let extractor = FixedPages(vec![
            PageText {
                number: 1,
                text: "first page ends\n".to_string(),
            },
            PageText {
                number: 2,
                text: "second page".to_string(),
            },
        ]);

        let text = extract_document_text_with(&extractor, Path::new("x.pdf"))
            .expect("fixed pages should join");

        assert_eq!(text, "first page ends\nsecond page");
        assert_eq!(text.split_whitespace().count(), 5);
    }

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.pdf");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = extract_document_text(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }

    #[test]
    fn page_texts_skip_blank_pages() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("two_pages.pdf");
        write_pdf(&path, &["Settlor clause", "", "Trustee powers"])?;

        let pages = extract_page_texts(&path)?;
        let numbers = pages.iter().map(|page| page.number).collect::<Vec<_>>();
        assert_eq!(numbers, vec![1, 3]);
        assert!(pages[0].text.contains("Settlor clause"));
        assert!(pages[1].text.contains("Trustee powers"));

        let text = extract_document_text(&path)?;
        assert!(text.contains("Settlor clause\n"));
        assert!(text.ends_with("Trustee powers"));
        Ok(())
    }

    #[test]
    fn pdf_without_text_is_empty() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("blank.pdf");
        write_pdf(&path, &[""])?;

        let result = extract_page_texts(&path);
        assert!(matches!(result, Err(IngestError::EmptyDocument(_))));
        Ok(())
    }

    fn write_pdf(path: &Path, pages: &[&str]) -> Result<(), Box<dyn std::error::Error>> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in pages {
            let operations = if text.is_empty() {
                Vec::new()
            } else {
                vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            };
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => kids.len() as i64,
                "Kids" => kids,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.save(path)?;
        Ok(())
    }
}
