use std::{env, path::PathBuf};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let proto_file = "proto/shardkv.proto";
    println!("cargo:rerun-if-changed={}", proto_file);

    // SAFETY: build scripts are single threaded.
    unsafe {
        env::set_var("PROTOC", protoc_bin_vendored::protoc_bin_path()?);
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    tonic_build::configure()
        .file_descriptor_set_path(out_dir.join("shardkv_descriptor.bin"))
        .compile_protos(&[proto_file], &["proto"])?;

    Ok(())
}
