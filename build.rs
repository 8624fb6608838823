use std::env;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Canonical foreign entry points: (name, parameter list, argument list).
/// Every argument is a pointer, as a Fortran caller passes them.
const ENTRY_POINTS: &[(&str, &str, &str)] = &[
    (
        "fftengine_plan_dft",
        "p: *mut *mut Plan, rank: *const c_int, n: *const c_int, sign: *const c_int, flags: *const c_int",
        "p, rank, n, sign, flags",
    ),
    (
        "fftengine_plan_r2r",
        "p: *mut *mut Plan, rank: *const c_int, n: *const c_int, kinds: *const c_int, flags: *const c_int",
        "p, rank, n, kinds, flags",
    ),
    (
        "fftengine_plan_guru_dft",
        "p: *mut *mut Plan, rank: *const c_int, n: *const c_int, is: *const c_int, os: *const c_int, \
         howmany_rank: *const c_int, h_n: *const c_int, h_is: *const c_int, h_os: *const c_int, \
         sign: *const c_int, flags: *const c_int",
        "p, rank, n, is, os, howmany_rank, h_n, h_is, h_os, sign, flags",
    ),
    (
        "fftengine_plan_guru_r2r",
        "p: *mut *mut Plan, rank: *const c_int, n: *const c_int, is: *const c_int, os: *const c_int, \
         howmany_rank: *const c_int, h_n: *const c_int, h_is: *const c_int, h_os: *const c_int, \
         kinds: *const c_int, flags: *const c_int",
        "p, rank, n, is, os, howmany_rank, h_n, h_is, h_os, kinds, flags",
    ),
    ("fftengine_destroy_plan", "p: *mut *mut Plan", "p"),
    (
        "fftengine_export_wisdom",
        "write_char: WriteCharFn, data: *mut c_void",
        "write_char, data",
    ),
    (
        "fftengine_import_wisdom",
        "isuccess: *mut c_int, read_char: ReadCharFn, data: *mut c_void",
        "isuccess, read_char, data",
    ),
    ("fftengine_forget_wisdom", "", ""),
    (
        "fftengine_cpu_supports",
        "result: *mut c_int, flag: *const c_int",
        "result, flag",
    ),
];

/// (suffix for the Rust identifier, symbol decoration, calling convention)
fn decorations(target_os: &str) -> Vec<(&'static str, fn(&str) -> String, &'static str)> {
    let mut list: Vec<(&'static str, fn(&str) -> String, &'static str)> = vec![
        ("u1", |name| format!("{name}_"), "C"),
        ("u2", |name| format!("{name}__"), "C"),
    ];
    if target_os == "windows" {
        list.push(("stdcall", |name| name.to_uppercase(), "system"));
    }
    list
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rustc-check-cfg=cfg(fault_trap)");

    let target_os = env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
    let target_arch = env::var("CARGO_CFG_TARGET_ARCH").unwrap_or_default();

    if target_os == "linux" && (target_arch == "x86_64" || target_arch == "aarch64") {
        println!("cargo:rustc-cfg=fault_trap");
    }

    let mut out = String::new();
    let mut table = String::from("pub const ALIAS_NAMES: &[(&str, &str)] = &[\n");

    for (name, params, args) in ENTRY_POINTS {
        for (suffix, decorate, abi) in decorations(&target_os) {
            let symbol = decorate(name);
            writeln!(out, "#[export_name = \"{symbol}\"]").unwrap();
            writeln!(
                out,
                "pub unsafe extern \"{abi}\" fn {name}_{suffix}({params}) {{ {name}({args}) }}\n"
            )
            .unwrap();
            writeln!(table, "    (\"{name}\", \"{symbol}\"),").unwrap();
        }
    }
    table.push_str("];\n");
    out.push_str(&table);

    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("foreign_aliases.rs"), out)
        .expect("failed to write foreign alias table");
}
