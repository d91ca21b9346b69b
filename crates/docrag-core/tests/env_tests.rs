//! Loads configuration through the process environment. Kept in its own test
//! binary so the variables it sets cannot leak into other tests.

use docrag_core::config::Config;

#[test]
fn production_load_fails_when_fake_embeddings_are_forced() {
    std::env::set_var("RUST_ENV", "prod");
    std::env::set_var("APP_VECTOR_STORE__BACKEND", "lancedb");

    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");
    let err = Config::load().err().expect("forced fake embeddings must be refused in prod");
    assert!(err.to_string().contains("APP_USE_FAKE_EMBEDDINGS"), "{}", err);

    std::env::remove_var("APP_USE_FAKE_EMBEDDINGS");
    let config = Config::load().expect("remote embedder is allowed in prod");
    assert_eq!(config.env_name(), "prod");
    std::env::remove_var("RUST_ENV");
    std::env::remove_var("APP_VECTOR_STORE__BACKEND");
}
