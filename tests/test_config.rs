use atrium::config::{Config, DirectoryPolicy};
use std::path::PathBuf;

#[test]
fn test_config_defaults() {
    let cfg = Config::default();

    assert_eq!(cfg.listen_addr, "127.0.0.1:3000");
    assert_eq!(cfg.root_dir, PathBuf::from("."));
    assert_eq!(cfg.max_connections, 1024);
    assert_eq!(cfg.max_header_bytes, 16 * 1024);
    assert_eq!(cfg.max_header_count, 100);
    assert_eq!(cfg.directory_policy, DirectoryPolicy::Listing);
    assert_eq!(cfg.read_timeout().as_secs(), 30);
    assert_eq!(cfg.response_timeout().as_secs(), 60);
    assert_eq!(cfg.shutdown_grace().as_secs(), 5);
}

#[test]
fn test_config_env_overrides() {
    // All env manipulation lives in this one test; tests run concurrently
    // and Config::load reads these variables.
    unsafe {
        std::env::remove_var("ATRIUM_CONFIG");
        std::env::set_var("LISTEN", "0.0.0.0:8000");
        std::env::set_var("ROOT", "/srv/www");
    }

    let cfg = Config::load();
    assert_eq!(cfg.listen_addr, "0.0.0.0:8000");
    assert_eq!(cfg.root_dir, PathBuf::from("/srv/www"));

    unsafe {
        std::env::remove_var("LISTEN");
        std::env::remove_var("ROOT");
    }
}

#[test]
fn test_config_from_file() {
    let path = std::env::temp_dir().join(format!("atrium-config-{}.yaml", std::process::id()));
    std::fs::write(
        &path,
        "listen_addr: \"127.0.0.1:9090\"\ndirectory_policy: forbidden\nmax_connections: 8\n",
    )
    .unwrap();

    let cfg = Config::from_file(path.to_str().unwrap()).unwrap();
    assert_eq!(cfg.listen_addr, "127.0.0.1:9090");
    assert_eq!(cfg.directory_policy, DirectoryPolicy::Forbidden);
    assert_eq!(cfg.max_connections, 8);

    // Fields absent from the file keep their defaults
    assert_eq!(cfg.max_header_count, 100);
    assert_eq!(cfg.shutdown_grace().as_secs(), 5);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_config_from_missing_file() {
    assert!(Config::from_file("/nonexistent/atrium.yaml").is_err());
}

#[test]
fn test_config_clone() {
    let cfg1 = Config::default();
    let cfg2 = cfg1.clone();
    assert_eq!(cfg1.listen_addr, cfg2.listen_addr);
    assert_eq!(cfg1.root_dir, cfg2.root_dir);
}
