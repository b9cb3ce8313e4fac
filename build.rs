use std::env;
use std::fs;
use std::path::Path;

fn main() {
    // Copy walltasks.toml to the output directory so a fresh build runs with
    // the documented defaults next to the executable.
    let Ok(out_dir) = env::var("OUT_DIR") else {
        return;
    };
    let out_path = Path::new(&out_dir);

    // OUT_DIR is target/<profile>/build/walltasks-xxx/out
    // Navigate up: out -> walltasks-xxx -> build -> <profile>
    if let Some(profile_dir) = out_path.ancestors().nth(3) {
        let src = Path::new("walltasks.toml");
        let dst = profile_dir.join("walltasks.toml");

        println!("cargo:rerun-if-changed=walltasks.toml");
        if src.exists() {
            if let Err(e) = fs::copy(src, &dst) {
                println!("cargo:warning=Failed to copy walltasks.toml: {}", e);
            }
        }
    }
}
