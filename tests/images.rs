//! Loading images and configuration the way the CLI does.

use regvm::program::image::parse_image;
use regvm::{disassemble, BufferedIo, Cpu, FlatMemory, HostConfig};

const HELLO: &str = "\
; print a string at address 16, then halt
0x0000_0001_0003_000A ; MOVI r3, 1
0x0000_0010_0004_000A ; MOVI r4, 16
0x0000_0000_0000_0014 ; SYSCALL
0x0000_0000_0000_0013 ; HALT
";

#[test]
fn text_image_runs_at_configured_address() {
    let config = HostConfig::from_json(r#"{ "memory_size": 64, "load_address": 4 }"#).unwrap();
    let image = parse_image(HELLO).unwrap();
    assert_eq!(image.len(), 4);

    let mut memory = FlatMemory::new(config.memory_size);
    memory.load_program(config.load_address, &image.words).unwrap();
    memory.load_cstring(16, b"hi there").unwrap();

    let mut io = BufferedIo::new();
    let mut cpu: Cpu<'_> = Cpu::new(config.cpu).unwrap();
    cpu.install_memory(&mut memory);
    cpu.install_io(&mut io);
    cpu.set_pc(config.load_address);
    cpu.set_running(true);

    assert_eq!(cpu.run().unwrap(), 4);
    assert_eq!(cpu.pc(), 7);
    drop(cpu);
    assert_eq!(io.take_output(), b"hi there");
}

#[test]
fn listing_names_every_instruction() {
    let image = parse_image(HELLO).unwrap();
    let listing = disassemble(&image.words);

    assert!(listing.contains("0000: MOVI r3, 1"));
    assert!(listing.contains("0001: MOVI r4, 16"));
    assert!(listing.contains("0002: SYSCALL"));
    assert!(listing.contains("0003: HALT"));
}

#[test]
fn snapshot_serializes() {
    let mut cpu: Cpu<'_> = Cpu::default();
    cpu.set_register(7, 99).unwrap();
    cpu.set_running(true);

    let json = serde_json::to_value(cpu.snapshot()).unwrap();
    assert_eq!(json["registers"][7], 99);
    assert_eq!(json["running"], true);
    assert_eq!(json["flag_names"][0], "RUNNING");
    assert!(json["fault"].is_null());
}
