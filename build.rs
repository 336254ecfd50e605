use std::env;
use std::process::Command;

fn main() {
    println!("cargo:rerun-if-env-changed=PYO3_PYTHON");

    // PyO3 picks the interpreter; ask the same one where libpython lives so
    // the embedding binaries and the cdylib can find it at link time.
    let python = env::var("PYO3_PYTHON").unwrap_or_else(|_| "python3".to_string());

    let Ok(output) = Command::new(&python)
        .args([
            "-c",
            "import sysconfig; print(sysconfig.get_config_var('LIBDIR'))",
        ])
        .output()
    else {
        return;
    };
    if !output.status.success() {
        return;
    }

    let libdir = String::from_utf8_lossy(&output.stdout);
    let libdir = libdir.trim();
    if !libdir.is_empty() && libdir != "None" {
        println!("cargo:rustc-link-search=native={libdir}");
    }
}
