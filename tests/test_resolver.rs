use atrium::serve::resolver::{Resolved, ResolveError, Resolver, normalize_target};
use std::path::PathBuf;

fn temp_root(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("atrium-resolver-{}-{}", name, std::process::id()));
    if dir.exists() {
        std::fs::remove_dir_all(&dir).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_normalize_plain_target() {
    assert_eq!(normalize_target("/a/b.txt").unwrap(), vec!["a", "b.txt"]);
}

#[test]
fn test_normalize_folds_dot_and_empty_segments() {
    assert_eq!(normalize_target("/./a//b/").unwrap(), vec!["a", "b"]);
    assert_eq!(normalize_target("/").unwrap(), Vec::<String>::new());
}

#[test]
fn test_normalize_folds_dotdot_inside_root() {
    assert_eq!(normalize_target("/a/../b").unwrap(), vec!["b"]);
    assert_eq!(normalize_target("/a/b/../../c").unwrap(), vec!["c"]);
}

#[test]
fn test_normalize_rejects_escape_above_root() {
    assert_eq!(
        normalize_target("/../../etc/passwd"),
        Err(ResolveError::Traversal)
    );
    assert_eq!(normalize_target("/a/../../b"), Err(ResolveError::Traversal));
    assert_eq!(normalize_target("/.."), Err(ResolveError::Traversal));
}

#[test]
fn test_normalize_rejects_encoded_escape() {
    // %2e%2e decodes to ".." — the guard runs after decoding
    assert_eq!(
        normalize_target("/%2e%2e/secret"),
        Err(ResolveError::Traversal)
    );
    assert_eq!(
        normalize_target("/a/%2E%2E/%2e%2e/b"),
        Err(ResolveError::Traversal)
    );
}

#[test]
fn test_normalize_decodes_escapes() {
    assert_eq!(
        normalize_target("/my%20file.txt").unwrap(),
        vec!["my file.txt"]
    );
}

#[test]
fn test_normalize_rejects_nul_byte() {
    assert_eq!(normalize_target("/a%00b"), Err(ResolveError::BadTarget));
}

#[test]
fn test_normalize_rejects_relative_target() {
    assert_eq!(normalize_target("index.html"), Err(ResolveError::BadTarget));
}

#[test]
fn test_normalize_strips_query_and_fragment() {
    assert_eq!(
        normalize_target("/a?redirect=../../etc").unwrap(),
        vec!["a"]
    );
    assert_eq!(normalize_target("/a#section").unwrap(), vec!["a"]);
}

#[tokio::test]
async fn test_resolve_existing_file() {
    let root = temp_root("file");
    std::fs::write(root.join("hello.txt"), b"hi").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/hello.txt").await.unwrap();

    assert_eq!(resolved, Resolved::File(resolver.root().join("hello.txt")));
}

#[tokio::test]
async fn test_resolve_nested_file() {
    let root = temp_root("nested");
    std::fs::create_dir_all(root.join("docs/guide")).unwrap();
    std::fs::write(root.join("docs/guide/intro.md"), b"# intro").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/docs/guide/intro.md").await.unwrap();

    assert_eq!(
        resolved,
        Resolved::File(resolver.root().join("docs/guide/intro.md"))
    );
}

#[tokio::test]
async fn test_resolve_missing_file() {
    let root = temp_root("missing");
    let resolver = Resolver::new(root).unwrap();

    assert_eq!(
        resolver.resolve("/nope.txt").await,
        Err(ResolveError::NotFound)
    );
}

#[tokio::test]
async fn test_resolve_traversal_rejected_before_fs_access() {
    let root = temp_root("traversal");
    let resolver = Resolver::new(root).unwrap();

    assert_eq!(
        resolver.resolve("/../../etc/passwd").await,
        Err(ResolveError::Traversal)
    );
}

#[tokio::test]
async fn test_resolve_directory_without_slash_redirects() {
    let root = temp_root("redirect");
    std::fs::create_dir_all(root.join("sub")).unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/sub").await.unwrap();

    assert_eq!(resolved, Resolved::Redirect("/sub/".to_string()));
}

#[tokio::test]
async fn test_resolve_directory_with_index() {
    let root = temp_root("index");
    std::fs::create_dir_all(root.join("sub")).unwrap();
    std::fs::write(root.join("sub/index.html"), b"<html></html>").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/sub/").await.unwrap();

    assert_eq!(
        resolved,
        Resolved::File(resolver.root().join("sub/index.html"))
    );
}

#[tokio::test]
async fn test_resolve_directory_index_htm_fallback() {
    let root = temp_root("index-htm");
    std::fs::write(root.join("index.htm"), b"<html></html>").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/").await.unwrap();

    assert_eq!(resolved, Resolved::File(resolver.root().join("index.htm")));
}

#[tokio::test]
async fn test_resolve_directory_without_index() {
    let root = temp_root("listing");
    std::fs::write(root.join("a.txt"), b"a").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/").await.unwrap();

    assert_eq!(resolved, Resolved::Directory(resolver.root().to_path_buf()));
}

#[tokio::test]
async fn test_resolve_decoded_segment() {
    let root = temp_root("decoded");
    std::fs::write(root.join("my file.txt"), b"spaces").unwrap();

    let resolver = Resolver::new(root).unwrap();
    let resolved = resolver.resolve("/my%20file.txt").await.unwrap();

    assert_eq!(resolved, Resolved::File(resolver.root().join("my file.txt")));
}

#[test]
fn test_resolver_requires_existing_root() {
    let missing = std::env::temp_dir().join("atrium-resolver-definitely-missing");
    assert!(Resolver::new(missing).is_err());
}
