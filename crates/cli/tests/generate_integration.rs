//! Integration test for `capgen generate`.
//!
//! Drives the real CLI entry point over a small Vulkan registry and an
//! OpenCL table in a temp directory, then verifies the determinism and
//! `--check` idempotence contracts end to end.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::Path;

const REGISTRY: &str = r#"<registry>
  <types>
    <type category="handle">VK_DEFINE_HANDLE(<name>VkDevice</name>)</type>
    <type category="handle">VK_DEFINE_NON_DISPATCHABLE_HANDLE(<name>VkBuffer</name>)</type>
  </types>
  <enums name="VkResult" type="enum">
    <enum name="VK_SUCCESS" value="0"/>
    <enum name="VK_NOT_READY" value="1"/>
  </enums>
  <commands>
    <command>
      <proto><type>VkResult</type> <name>vkCreateBuffer</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
      <param><type>VkBuffer</type>* <name>pBuffer</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkDestroyBuffer</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
      <param><type>VkBuffer</type> <name>buffer</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkWriteData</name></proto>
      <param><type>VkBuffer</type> <name>buffer</name></param>
      <param><type>uint32_t</type> <name>count</name></param>
      <param len="count">const <type>int32_t</type>* <name>pValues</name></param>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require>
      <command name="vkCreateBuffer"/>
      <command name="vkDestroyBuffer"/>
    </require>
  </feature>
</registry>"#;

const CL_TABLE: &str = r#"
version = "3.0"

[[type]]
name = "cl_mem"
kind = "handle"

[[function]]
name = "clReleaseMemObject"
ret = "int32_t"
category = "destructor"

[[function.param]]
name = "memobj"
type = "cl_mem"
ownership = "destroyed"

[[element]]
name = "Capture.Frames"
type = "uint32_t"
default = "0"
description = "Number of frames to capture."
"#;

fn write_project(dir: &Path) -> std::path::PathBuf {
    fs::write(dir.join("vk.xml"), REGISTRY).unwrap();
    fs::write(dir.join("cl.toml"), CL_TABLE).unwrap();
    let config = format!(
        r#"output_root = "{out}"
format = false

[api.vulkan]
registry = "{vk}"

[api.opencl]
tables = "{cl}"
"#,
        out = dir.join("generated").display(),
        vk = dir.join("vk.xml").display(),
        cl = dir.join("cl.toml").display(),
    );
    let path = dir.join("capgen.toml");
    fs::write(&path, config).unwrap();
    path
}

fn run(config: &Path, extra: &[&str]) -> i32 {
    let mut args = vec![
        "capgen".to_string(),
        "generate".to_string(),
        "--config".to_string(),
        config.display().to_string(),
    ];
    args.extend(extra.iter().map(|s| (*s).to_string()));
    capgen_cli::run(args)
}

#[test]
fn generate_then_check_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path());

    assert_eq!(run(&config, &[]), 0, "first generate must succeed");

    let out = dir.path().join("generated");
    assert!(out.join("vulkan/recorder.cpp").exists());
    assert!(out.join("vulkan/player.cpp").exists());
    assert!(out.join("vulkan/serialization.h").exists());
    assert!(out.join("opencl/config_bindings.h").exists());
    assert!(out.join("manifest.json").exists());
    assert!(out.join("diagnostics.json").exists());

    // Property 2: --check right after a generate is clean.
    assert_eq!(run(&config, &["--check"]), 0);

    // Property 1: a second run leaves the manifest byte-identical.
    let manifest_a = fs::read_to_string(out.join("manifest.json")).unwrap();
    assert_eq!(run(&config, &[]), 0);
    let manifest_b = fs::read_to_string(out.join("manifest.json")).unwrap();
    assert_eq!(manifest_a, manifest_b);
}

#[test]
fn check_detects_drift_with_exit_code_6() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path());
    assert_eq!(run(&config, &[]), 0);

    let target = dir.path().join("generated/vulkan/recorder.cpp");
    fs::write(&target, "// tampered\n").unwrap();
    assert_eq!(run(&config, &["--check"]), 6);
}

#[test]
fn api_filter_narrows_the_output_tree() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path());
    assert_eq!(run(&config, &["--api", "opencl"]), 0);
    let out = dir.path().join("generated");
    assert!(out.join("opencl/config_bindings.h").exists());
    assert!(!out.join("vulkan").exists());
}

#[test]
fn unknown_emitter_fails_with_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path());
    assert_eq!(run(&config, &["--emitter", "bogus"]), 2);
}

#[test]
fn destroyed_annotation_flows_into_player_output() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_project(dir.path());
    assert_eq!(run(&config, &[]), 0);
    let player = fs::read_to_string(dir.path().join("generated/opencl/player.cpp")).unwrap();
    assert!(player.contains("ctx.remap_cl_mem.Remove(captured_memobj);"));
}
