use image::{DynamicImage, RgbImage};
use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use reisekosten::config::RasterizerSettings;
use reisekosten::error::{ExpenseError, Result};
use reisekosten::rasterizer::{
    load_pdfium, page_pixel_size, rasterize_pdf, sources_from_settings, PdfRenderer, RendererProvider,
    RendererSource,
};

/// Renders a fixed number of blank pages
struct BlankPages(usize);

impl PdfRenderer for BlankPages {
    fn render_pages(&self, _pdf: &[u8], target_width: u32) -> Result<Vec<DynamicImage>> {
        Ok((0..self.0)
            .map(|_| DynamicImage::ImageRgb8(RgbImage::new(target_width, target_width * 2)))
            .collect())
    }
}

struct Broken;

impl PdfRenderer for Broken {
    fn render_pages(&self, _pdf: &[u8], _target_width: u32) -> Result<Vec<DynamicImage>> {
        Err(ExpenseError::Rasterize("corrupt xref".to_string()))
    }
}

/// Loader that records every attempt and only succeeds for the system library
fn recording_loader(
    attempts: Rc<RefCell<Vec<RendererSource>>>,
) -> Box<dyn Fn(&RendererSource) -> Result<Box<dyn PdfRenderer>>> {
    Box::new(move |source: &RendererSource| -> Result<Box<dyn PdfRenderer>> {
        attempts.borrow_mut().push(source.clone());
        match source {
            RendererSource::SystemLibrary => Ok(Box::new(BlankPages(1))),
            _ => Err(ExpenseError::RendererUnavailable(format!("{source} missing"))),
        }
    })
}

fn remote(url: &str) -> RendererSource {
    RendererSource::Remote {
        url: url.to_string(),
        cache_dir: PathBuf::from("/tmp/cache"),
        timeout: Duration::from_secs(1),
    }
}

#[test]
fn test_sources_in_configured_order() {
    let settings = RasterizerSettings {
        local_library: Some("pdfium".to_string()),
        use_system_library: true,
        remote_sources: vec!["https://a.example/pdfium.so".to_string()],
        cache_dir: None,
        timeout_secs: 5,
    };

    let sources = sources_from_settings(&settings, Path::new("/cfg"));
    assert_eq!(
        sources,
        vec![
            RendererSource::LocalLibrary(PathBuf::from("/cfg/pdfium")),
            RendererSource::SystemLibrary,
            RendererSource::Remote {
                url: "https://a.example/pdfium.so".to_string(),
                cache_dir: PathBuf::from("/cfg/cache"),
                timeout: Duration::from_secs(5),
            },
        ]
    );
}

#[test]
fn test_first_working_source_wins() {
    let attempts = Rc::new(RefCell::new(Vec::new()));
    let provider = RendererProvider::new(
        vec![
            RendererSource::LocalLibrary(PathBuf::from("/nowhere")),
            RendererSource::SystemLibrary,
            remote("https://b.example/pdfium.so"),
        ],
        recording_loader(attempts.clone()),
    );

    assert!(!provider.is_loaded());
    provider.acquire().unwrap();
    assert!(provider.is_loaded());

    // the remote source is never tried
    assert_eq!(attempts.borrow().len(), 2);
    assert_eq!(attempts.borrow()[1], RendererSource::SystemLibrary);
}

#[test]
fn test_loaded_renderer_is_reused() {
    let attempts = Rc::new(RefCell::new(Vec::new()));
    let provider = RendererProvider::new(
        vec![RendererSource::SystemLibrary],
        recording_loader(attempts.clone()),
    );

    provider.acquire().unwrap();
    provider.acquire().unwrap();
    provider.acquire().unwrap();
    assert_eq!(attempts.borrow().len(), 1);
}

#[test]
fn test_all_sources_failing_is_retried_later() {
    let attempts = Rc::new(RefCell::new(Vec::new()));
    let provider = RendererProvider::new(
        vec![
            RendererSource::LocalLibrary(PathBuf::from("/nowhere")),
            remote("https://c.example/pdfium.so"),
        ],
        recording_loader(attempts.clone()),
    );

    let err = provider.acquire().err().unwrap();
    assert!(matches!(err, ExpenseError::RendererUnavailable(_)));
    assert!(err.to_string().contains("c.example"));

    assert!(provider.acquire().is_err());
    assert_eq!(attempts.borrow().len(), 4);
    assert!(!provider.is_loaded());
}

#[test]
fn test_no_sources() {
    let provider = RendererProvider::new(Vec::new(), recording_loader(Rc::default()));
    let err = provider.acquire().err().unwrap();
    assert!(err.to_string().contains("no sources configured"));
}

#[test]
fn test_page_pixel_size() {
    // A4 portrait
    assert_eq!(page_pixel_size(595.0, 842.0, 1360), (1360, 1925));
    // A4 landscape
    assert_eq!(page_pixel_size(842.0, 595.0, 1360), (1360, 961));
    assert_eq!(page_pixel_size(0.0, 842.0, 1360), (1360, 1360));
}

#[test]
fn test_rasterize_names_pages() {
    let renderer = BlankPages(3);
    let pages = rasterize_pdf(&renderer, "hotel.pdf", b"%PDF", 100, 0.72).unwrap();

    let names: Vec<&str> = pages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(
        names,
        ["hotel.pdf (Seite 1)", "hotel.pdf (Seite 2)", "hotel.pdf (Seite 3)"]
    );
    assert!(pages.iter().all(|p| p.width == 100 && p.height == 200));
}

#[test]
fn test_rasterize_failure_names_attachment() {
    let err = rasterize_pdf(&Broken, "kaputt.pdf", b"", 100, 0.72).unwrap_err();
    match err {
        ExpenseError::PdfRender { name, reason } => {
            assert_eq!(name, "kaputt.pdf");
            assert!(reason.contains("corrupt xref"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// Serves `body` to every request on a local port and counts the requests
fn serve(body: &'static [u8]) -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/libpdfium.so", listener.local_addr().unwrap());
    let hits = Arc::new(AtomicUsize::new(0));

    let counter = hits.clone();
    thread::spawn(move || {
        for stream in listener.incoming() {
            let mut stream = stream.unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }
            counter.fetch_add(1, Ordering::SeqCst);
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .unwrap();
            stream.write_all(body).unwrap();
        }
    });

    (url, hits)
}

fn remote_in(url: &str, cache_dir: &Path) -> RendererSource {
    RendererSource::Remote {
        url: url.to_string(),
        cache_dir: cache_dir.to_path_buf(),
        timeout: Duration::from_secs(5),
    }
}

#[test]
fn test_unusable_download_is_not_reused() {
    let cache = TempDir::new().unwrap();
    let (junk_url, junk_hits) = serve(b"not a library");
    let (other_url, other_hits) = serve(b"also not a library");

    assert!(load_pdfium(&remote_in(&junk_url, cache.path())).is_err());
    assert_eq!(junk_hits.load(Ordering::SeqCst), 1);

    // a different URL downloads again instead of picking up the junk file
    assert!(load_pdfium(&remote_in(&other_url, cache.path())).is_err());
    assert_eq!(other_hits.load(Ordering::SeqCst), 1);

    // the failed download was dropped from the cache, so a later run retries
    assert!(load_pdfium(&remote_in(&junk_url, cache.path())).is_err());
    assert_eq!(junk_hits.load(Ordering::SeqCst), 2);
}
