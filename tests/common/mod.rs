use pybridge::{Config, Session};

/// Boot the shared interpreter once per test binary.
pub fn session() -> &'static Session {
    let _ = env_logger::builder().is_test(true).try_init();
    Session::initialize_with(Config::default()).expect("interpreter bootstrap")
}
