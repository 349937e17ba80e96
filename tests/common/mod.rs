//! Shared fixtures: generated PDFs, a counting stub backend, and context
//! construction against a temp directory.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use docdrop::config::Config;
use docdrop::coordinator::AppContext;
use docdrop::qa::QaBackend;

/// Build a one-page PDF containing `text`.
pub fn make_pdf(text: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().expect("encode content"),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

/// Stub backend that counts embed calls and can be told to fail.
pub struct StubBackend {
    calls: AtomicUsize,
    pub fail_embed: bool,
    pub fail_answer: bool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_embed: false,
            fail_answer: false,
        }
    }

    pub fn failing_embed() -> Self {
        Self {
            fail_embed: true,
            ..Self::new()
        }
    }

    pub fn failing_answer() -> Self {
        Self {
            fail_answer: true,
            ..Self::new()
        }
    }

    pub fn embed_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QaBackend for StubBackend {
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }

    async fn answer(&self, question: &str, _excerpts: &[String]) -> anyhow::Result<String> {
        if self.fail_answer {
            anyhow::bail!("chat completion failed");
        }
        Ok(format!("answer to: {}", question))
    }
}

/// Config rooted in a temp directory.
pub fn test_config(tmp: &Path) -> Config {
    let mut config = Config::default();
    config.storage.upload_dir = tmp.join("docs");
    config.storage.index_dir = tmp.join("embeddings");
    config
}

/// Fresh context with the given stub backend.
pub fn context(tmp: &Path, backend: StubBackend) -> (Arc<AppContext>, Arc<StubBackend>) {
    let backend = Arc::new(backend);
    let ctx = AppContext::new(test_config(tmp), Ok(backend.clone() as Arc<dyn QaBackend>))
        .expect("context");
    (ctx, backend)
}

/// Fresh context whose backend probe failed at startup.
pub fn context_without_backend(tmp: &Path) -> Arc<AppContext> {
    AppContext::new(
        test_config(tmp),
        Err("Missing required environment variables: AZURE_OPENAI_API_KEY".to_string()),
    )
    .expect("context")
}
