//! End-to-end tests over the public API: parsers, orchestrator, queue and store

use std::io::{Cursor, Write};
use std::sync::Arc;
use std::time::Duration;

use doc_parse::config::{BridgeConfig, QueueConfig};
use doc_parse::ingestion::{assemble_text, xml, DocxParser, PdfParser, PlainTextParser, MIME_DOCX, MIME_PDF};
use doc_parse::{
    Database, EnqueueOutcome, Error, InMemoryFileStore, JobQueue, JobState, ParseService, Parser,
    ParserRegistry, ParsingJobManager, ResultStore,
};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tokio_test::assert_ok;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

fn docx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in parts {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn pdf(text: Option<&str>) -> Vec<u8> {
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

    let operations = match text {
        Some(text) => vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![100.into(), 600.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
        None => vec![],
    };
    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

fn service(files: Arc<InMemoryFileStore>) -> ParseService {
    ParseService::new(Arc::new(ParserRegistry::with_builtin()), files)
}

#[test]
fn supports_matches_only_own_type() {
    let parsers: [&dyn Parser; 3] = [&PlainTextParser, &PdfParser, &DocxParser];
    for (i, parser) in parsers.iter().enumerate() {
        for (j, mime) in ["text/plain", MIME_PDF, MIME_DOCX].iter().enumerate() {
            assert_eq!(parser.supports(mime), i == j);
        }
    }
}

#[test]
fn plain_text_hello() {
    let output = assert_ok!(PlainTextParser.parse(b"hello"));
    assert_eq!(output.text, "hello");
    assert_eq!(output.parsed_percentage, 100.0);
}

#[test]
fn pdf_without_text_is_zero_percent() {
    let output = assert_ok!(PdfParser.parse(&pdf(None)));
    assert_eq!(output.text, "");
    assert_eq!(output.parsed_percentage, 0.0);
}

#[test]
fn pdf_text_is_extracted() {
    let bytes = pdf(Some("Hello World"));
    let output = assert_ok!(PdfParser.parse(&bytes));
    assert!(output.text.contains("Hello"), "got {:?}", output.text);
    assert_eq!(output.parsed_percentage.fract(), 0.0);
    assert!(output.parsed_comment.unwrap().contains("document bytes"));
}

#[test]
fn docx_without_main_document() {
    let bytes = docx(&[("[Content_Types].xml", "<Types/>")]);
    let output = assert_ok!(DocxParser.parse(&bytes));
    assert_eq!(output.text, "");
    assert_eq!(output.parsed_percentage, 0.0);
}

#[test]
fn docx_unresolved_footnote_is_fatal() {
    let bytes = docx(&[
        (
            "word/document.xml",
            r#"<w:document><w:body><w:p><w:r><w:t>Claim</w:t></w:r><w:r><w:footnoteReference w:id="3"/></w:r></w:p></w:body></w:document>"#,
        ),
        (
            "word/footnotes.xml",
            r#"<w:footnotes><w:footnote w:id="1"><w:p><w:r><w:t>Only note</w:t></w:r></w:p></w:footnote></w:footnotes>"#,
        ),
    ]);

    let err = DocxParser.parse(&bytes).unwrap_err();
    assert!(matches!(err, Error::MalformedInput { .. }));
}

#[test]
fn assemble_text_is_callable_on_trees() {
    let document = xml::parse_document(
        br#"<w:document><w:body>
            <w:p><w:r><w:t>Alpha</w:t></w:r><w:r><w:endnoteReference w:id="1"/></w:r></w:p>
            <w:p><w:r><w:t>Beta</w:t></w:r></w:p>
        </w:body></w:document>"#,
    )
    .unwrap();
    let endnotes = xml::parse_document(
        br#"<w:endnotes><w:endnote w:id="1"><w:p><w:r><w:t>Source</w:t></w:r></w:p></w:endnote></w:endnotes>"#,
    )
    .unwrap();

    let text = assemble_text(&document, None, Some(&endnotes)).unwrap();
    assert_eq!(text, "Alpha (Endnote: Source)\nBeta");
}

#[tokio::test]
async fn orchestrator_sniffs_docx_by_content() {
    let files = Arc::new(InMemoryFileStore::new());
    let file_id = Uuid::new_v4();
    files.insert(
        file_id,
        docx(&[(
            "word/document.xml",
            r#"<w:document><w:body><w:p><w:r><w:t>Zipped words</w:t></w:r></w:p></w:body></w:document>"#,
        )]),
    );

    let result = assert_ok!(service(files).parse_file(file_id).await);
    assert_eq!(result.mime_type, MIME_DOCX);
    assert_eq!(result.text, "Zipped words");
}

#[tokio::test]
async fn orchestrator_failures_are_typed() {
    let files = Arc::new(InMemoryFileStore::new());
    let zip_id = Uuid::new_v4();
    files.insert(zip_id, docx(&[("notes/readme.txt", "plain zip")]));
    let service = service(files);

    let missing = Uuid::new_v4();
    assert!(matches!(
        service.parse_file(missing).await,
        Err(Error::FileNotFound(id)) if id == missing
    ));

    match service.parse_file(zip_id).await {
        Err(Error::UnsupportedFormat(mime)) => assert_eq!(mime, "application/zip"),
        other => panic!("expected unsupported format, got {:?}", other.map(|r| r.mime_type)),
    }
}

#[tokio::test]
async fn enqueue_is_idempotent_until_terminal() {
    let db = Database::in_memory().unwrap();
    let queue = Arc::new(JobQueue::new(
        db,
        QueueConfig {
            poll_interval_ms: 20,
            ..Default::default()
        },
    ));
    let file_id = Uuid::new_v4();

    assert_eq!(queue.enqueue(file_id).await.unwrap(), EnqueueOutcome::Created);
    assert_eq!(queue.enqueue(file_id).await.unwrap(), EnqueueOutcome::AlreadyPending);
    assert_eq!(queue.stats().await.unwrap().total(), 1);

    let worker = queue.register_worker(|_| async { Ok(()) }).await.unwrap();
    let mut state = JobState::Created;
    for _ in 0..300 {
        state = queue.get_job(file_id).await.unwrap().unwrap().state;
        if state == JobState::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state, JobState::Completed);

    worker.abort();
    assert_eq!(queue.enqueue(file_id).await.unwrap(), EnqueueOutcome::Replaced);
    let job = queue.get_job(file_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Created);
}

#[test]
fn result_store_round_trip() {
    let store = ResultStore::new(Database::in_memory().unwrap());
    let result = doc_parse::ParseResult {
        file_id: Uuid::new_v4(),
        text: "persisted".to_string(),
        mime_type: "text/plain".to_string(),
        parsed_percentage: 42.5,
        parsed_comment: Some("checked".to_string()),
    };

    store.save(&result).unwrap();
    let record = store.get(&result.file_id).unwrap().unwrap();
    assert_eq!(record.text, result.text);
    assert_eq!(record.parsed_percentage, Some(result.parsed_percentage));
    assert_eq!(record.parsed_comment, result.parsed_comment);
}

#[tokio::test]
async fn queued_parse_lands_in_result_store() {
    let db = Database::in_memory().unwrap();
    let files = Arc::new(InMemoryFileStore::new());
    let file_id = Uuid::new_v4();
    files.insert(file_id, pdf(Some("Queued PDF")));

    let queue = Arc::new(JobQueue::new(
        db.clone(),
        QueueConfig {
            poll_interval_ms: 20,
            ..Default::default()
        },
    ));
    let results = ResultStore::new(db);
    let manager = ParsingJobManager::new(
        queue.clone(),
        results.clone(),
        service(files),
        BridgeConfig::default(),
    );
    manager.start().await.unwrap();
    manager.enqueue(file_id).await.unwrap();

    let mut record = None;
    for _ in 0..300 {
        record = results.get(&file_id).unwrap();
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let record = record.expect("parse result was not saved");
    assert!(record.text.contains("Queued"));
    manager.shutdown();
}
