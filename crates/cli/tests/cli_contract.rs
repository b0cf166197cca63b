use assert_cmd::Command;
use lopdf::{dictionary, Document, Object, Stream};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn pdf_with_pages(sizes: &[(f32, f32)]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids: Vec<Object> = Vec::new();
    for &(width, height) in sizes {
        let content_id = doc.add_object(Stream::new(dictionary! {}, Vec::new()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => sizes.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("fixture serializes");
    bytes
}

fn write_fixture(dir: &Path, name: &str, pages: usize) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, pdf_with_pages(&vec![(612.0, 792.0); pages])).expect("fixture write");
    path
}

fn write_signature_png(dir: &Path) -> PathBuf {
    let path = dir.join("signature.png");
    let mut pixels = image::RgbaImage::from_pixel(200, 100, image::Rgba([0, 0, 0, 0]));
    for x in 40..160 {
        pixels.put_pixel(x, 50, image::Rgba([0, 0, 100, 255]));
    }
    pixels.save(&path).expect("signature png");
    path
}

fn inkmark() -> Command {
    Command::cargo_bin("inkmark").expect("binary builds")
}

#[test]
fn info_emits_page_count_and_sizes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(dir.path(), "doc.pdf", 2);

    let output = inkmark()
        .arg("info")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("valid json");
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"].as_array().expect("pages array").len(), 2);
    assert_eq!(value["pages"][0]["width"], 612.0);
}

#[test]
fn info_fails_for_missing_file() {
    inkmark()
        .arg("info")
        .arg("/nonexistent/missing.pdf")
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn info_fails_for_invalid_pdf() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("invalid.pdf");
    fs::write(&file, b"not a pdf at all").expect("write");

    inkmark()
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn sign_writes_a_stamped_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(dir.path(), "doc.pdf", 1);
    let signature = write_signature_png(dir.path());
    let output = dir.path().join("signed.pdf");

    let stdout = inkmark()
        .arg("sign")
        .arg(&file)
        .arg("--image")
        .arg(&signature)
        .arg("--x")
        .arg("400")
        .arg("--y")
        .arg("300")
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&stdout).expect("valid json");
    assert_eq!(value["applied"], 1);
    assert_eq!(value["skipped"], 0);
    assert!(output.exists());

    // The stamped copy still parses as a one-page document.
    let doc = Document::load(&output).expect("output parses");
    assert_eq!(doc.get_pages().len(), 1);
}

#[test]
fn text_writes_an_annotated_copy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(dir.path(), "doc.pdf", 1);
    let output = dir.path().join("annotated.pdf");

    inkmark()
        .arg("text")
        .arg(&file)
        .arg("--text")
        .arg("Approved")
        .arg("--x")
        .arg("100")
        .arg("--y")
        .arg("100")
        .arg("--output")
        .arg(&output)
        .assert()
        .success();

    let doc = Document::load(&output).expect("output parses");
    assert_eq!(doc.get_pages().len(), 1);
}

#[test]
fn text_rejects_page_zero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(dir.path(), "doc.pdf", 1);

    inkmark()
        .arg("text")
        .arg(&file)
        .arg("--text")
        .arg("x")
        .arg("--page")
        .arg("0")
        .arg("--x")
        .arg("0")
        .arg("--y")
        .arg("0")
        .arg("--output")
        .arg(dir.path().join("out.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("1-based"));
}

#[test]
fn merge_reports_skipped_inputs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = write_fixture(dir.path(), "a.pdf", 3);
    let b = dir.path().join("b.pdf");
    let mut encrypted = pdf_with_pages(&[(612.0, 792.0)]);
    encrypted.extend_from_slice(b"/Encrypt 9 0 R");
    fs::write(&b, encrypted).expect("write encrypted");
    let c = write_fixture(dir.path(), "c.pdf", 2);
    let output = dir.path().join("merged.pdf");

    let stdout = inkmark()
        .arg("merge")
        .arg(&a)
        .arg(&b)
        .arg(&c)
        .arg("--output")
        .arg(&output)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&stdout).expect("valid json");
    assert_eq!(value["page_count"], 5);
    assert_eq!(value["skipped"].as_array().expect("skipped").len(), 1);
    assert_eq!(value["skipped"][0], "b.pdf");

    let doc = Document::load(&output).expect("merged output parses");
    assert_eq!(doc.get_pages().len(), 5);
}

#[test]
fn merge_fails_when_nothing_is_mergeable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad = dir.path().join("bad.pdf");
    fs::write(&bad, b"garbage").expect("write");

    inkmark()
        .arg("merge")
        .arg(&bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("merge failed"));
}

#[test]
fn print_writes_one_png_per_page() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = write_fixture(dir.path(), "doc.pdf", 2);
    let out_dir = dir.path().join("pages");

    inkmark()
        .arg("print")
        .arg(&file)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--width")
        .arg("620")
        .arg("--height")
        .arg("877")
        .assert()
        .success();

    for name in ["page-001.png", "page-002.png"] {
        let path = out_dir.join(name);
        assert!(path.exists(), "{name} should exist");
        let image = image::open(&path).expect("readable png");
        assert_eq!(image.width(), 620);
        assert_eq!(image.height(), 877);
    }
}
