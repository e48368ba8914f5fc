//! Console commands over a runtime built from command-line arguments.

use clap::Parser;
use glyphfs_cli::{Args, Console, describe, load_config};
use glyphfs_kernel::Runtime;
use glyphfs_testutil::Fat32ImageBuilder;

/// Run lines through a console and collect outputs, errors included.
fn run_script(console: &mut Console, script: &str) -> Vec<String> {
    let mut outputs = Vec::new();
    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match console.process_line(trimmed) {
            Ok(Some(output)) => outputs.push(output),
            Ok(None) => {}
            Err(e) => outputs.push(describe(&e)),
        }
    }
    outputs
}

fn console_with_image() -> (tempfile::TempDir, Console) {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("disk.img");
    std::fs::write(
        &image,
        Fat32ImageBuilder::new()
            .file("HELLO.TXT", b"Hello from FAT32\n")
            .build(),
    )
    .unwrap();

    let empty_config = dir.path().join("glyphfs.toml");
    std::fs::write(&empty_config, "").unwrap();
    let args = Args::try_parse_from([
        "glyphfs",
        "--config",
        empty_config.to_str().unwrap(),
        "--image",
        image.to_str().unwrap(),
        "--mount",
        "/disk",
    ])
    .unwrap();

    let config = load_config(&args).unwrap();
    let console = Console::new(Runtime::new(&config).unwrap());
    (dir, console)
}

#[test]
fn fat_image_is_mounted_read_only() {
    let (_dir, mut console) = console_with_image();
    let outputs = run_script(
        &mut console,
        r#"
        cat /disk/HELLO.TXT
        write /disk/HELLO.TXT nope
        mounts
        devices
        "#,
    );
    assert_eq!(outputs[0], "Hello from FAT32\n");
    assert!(outputs[1].starts_with("EROFS"), "{}", outputs[1]);
    assert!(outputs[2].contains("/disk"));
    assert!(outputs[2].contains("fat32"));
    assert!(outputs[2].contains("ro"));
    assert!(outputs[3].starts_with("image0"));
}

#[test]
fn overlay_commands() {
    let (_dir, mut console) = console_with_image();
    let outputs = run_script(
        &mut console,
        r#"
        uc-write [🌍]notes[🌍]todo.txt buy milk
        uc-cat [🌍]notes[🌍]todo.txt
        uc-exists [🌍]notes[🌍]todo.txt
        uc-exists [🌍]notes[🌍]done.txt
        canon [🌍]notes[🌍]todo.txt
        prompt /ucfs/U+1F30D/notes/todo.txt
        px-write {0,0,255}sky.txt blue
        px-cat {0,0,255}sky.txt
        canon {0,0,255}sky.txt
        prompt /pxfs/0000FF/sky.txt
        uc-write plain.txt nope
        "#,
    );
    assert_eq!(outputs.len(), 9);
    assert_eq!(
        &outputs[..8],
        &[
            "buy milk",
            "true",
            "false",
            "/ucfs/U+1F30D/notes/todo.txt",
            "[🌍]notes[🌍]todo.txt",
            "blue",
            "/pxfs/0000FF/sky.txt",
            "{0,0,255}sky.txt",
        ]
    );
    assert!(outputs[8].starts_with("EINVAL"), "{}", outputs[8]);
}

#[test]
fn default_args() {
    let args = Args::try_parse_from(["glyphfs"]).unwrap();
    assert_eq!(args.mount, "/fat");
    assert!(args.image.is_none());
    assert!(args.commands.is_empty());

    let args = Args::try_parse_from(["glyphfs", "-c", "ls /", "-c", "mounts"]).unwrap();
    assert_eq!(args.commands, vec!["ls /", "mounts"]);
}

#[test]
fn listing_shows_mounts_and_overlay_roots() {
    let (_dir, mut console) = console_with_image();
    let outputs = run_script(
        &mut console,
        r#"
        uc-write [🌍]a x
        ls /
        ls /disk
        "#,
    );
    assert_eq!(outputs[0], "disk/\nucfs/");
    assert!(outputs[1].starts_with("HELLO.TXT"));
    assert!(outputs[1].ends_with("17"));
}
