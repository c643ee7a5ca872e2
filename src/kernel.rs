// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Kernel source loading.  The kernels are plain WGSL files next to the
//! binary's working directory, so they can be edited without a
//! rebuild; copies are compiled in for when they are not there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::Strategy;
use crate::error::{RenderError, Result};

/// Name of the entry point every kernel exports.
pub const ENTRY_POINT: &str = "mandel_iters";

const WORKGROUP_DECL: &str = "const WORKGROUP_SIZE";

const SINGLE_SHOT_SOURCE: &str = include_str!("../mandel.wgsl");
const RESUMABLE_SOURCE: &str = include_str!("../mandel_resumable.wgsl");

/// Where a kernel's text came from.
#[derive(Clone, Debug, PartialEq)]
pub enum Origin {
    /// Read from a file.
    File(PathBuf),
    /// The copy compiled into the binary.
    BuiltIn,
}

/// Kernel text ready to hand to the device.
#[derive(Clone, Debug)]
pub struct KernelSource {
    /// Where the text came from, for diagnostics.
    pub origin: Origin,
    /// WGSL source.
    pub text: String,
}

/// The file name each strategy's kernel is looked up under.
pub fn default_path(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::SingleShot => "mandel.wgsl",
        Strategy::Resumable { .. } => "mandel_resumable.wgsl",
    }
}

impl KernelSource {
    /// The compiled-in kernel for `strategy`.
    pub fn builtin(strategy: Strategy) -> Self {
        let text = match strategy {
            Strategy::SingleShot => SINGLE_SHOT_SOURCE,
            Strategy::Resumable { .. } => RESUMABLE_SOURCE,
        };
        KernelSource {
            origin: Origin::BuiltIn,
            text: text.to_string(),
        }
    }

    /// Reads the kernel from `path`.  A missing file is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(RenderError::KernelSource)?;
        if text.trim().is_empty() {
            return Err(RenderError::KernelSource(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is empty", path.display()),
            )));
        }
        Ok(KernelSource {
            origin: Origin::File(path.to_path_buf()),
            text,
        })
    }

    /// Resolves the kernel for `strategy`: an explicit path must
    /// exist; otherwise the default file in the working directory is
    /// used when present, and the built-in copy when not.
    pub fn load(path: Option<&Path>, strategy: Strategy) -> Result<Self> {
        if let Some(path) = path {
            return KernelSource::from_file(path);
        }
        let path = Path::new(default_path(strategy));
        if path.is_file() {
            KernelSource::from_file(path)
        } else {
            warn!("{} not found, using the built-in kernel", path.display());
            Ok(KernelSource::builtin(strategy))
        }
    }

    /// The source with its work-group size declaration replaced by
    /// `size`.
    pub fn with_workgroup_size(&self, size: u32) -> Result<String> {
        let mut found = false;
        let mut out = String::with_capacity(self.text.len());
        for line in self.text.lines() {
            if line.trim_start().starts_with(WORKGROUP_DECL) {
                out.push_str(&format!("{}: u32 = {}u;", WORKGROUP_DECL, size));
                found = true;
            } else {
                out.push_str(line);
            }
            out.push('\n');
        }
        if found {
            Ok(out)
        } else {
            Err(RenderError::KernelBuild {
                log: format!(
                    "{}: kernel does not declare `{}: u32`",
                    self.describe(),
                    WORKGROUP_DECL
                ),
            })
        }
    }

    /// Human-readable origin.
    pub fn describe(&self) -> String {
        match self.origin {
            Origin::File(ref path) => path.display().to_string(),
            Origin::BuiltIn => "<built-in>".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_kernels_export_the_entry_point() {
        for &strategy in [Strategy::SingleShot, Strategy::Resumable { max_loop: 8 }].iter() {
            let kernel = KernelSource::builtin(strategy);
            assert!(kernel.text.contains(&format!("fn {}(", ENTRY_POINT)));
            assert_eq!(kernel.origin, Origin::BuiltIn);
        }
    }

    #[test]
    fn workgroup_size_is_substituted() {
        let kernel = KernelSource::builtin(Strategy::SingleShot);
        let text = kernel.with_workgroup_size(256).unwrap();
        assert!(text.contains("const WORKGROUP_SIZE: u32 = 256u;"));
        assert!(!text.contains("const WORKGROUP_SIZE: u32 = 64u;"));
        assert!(text.contains("@workgroup_size(WORKGROUP_SIZE)"));
    }

    fn validate(source: &str) -> naga::Module {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|e| panic!("{}", e.emit_to_string(source)));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        )
        .validate(&module)
        .unwrap();
        module
    }

    #[test]
    fn builtin_kernels_compile_at_any_workgroup_size() {
        for &strategy in [Strategy::SingleShot, Strategy::Resumable { max_loop: 8 }].iter() {
            for &size in [1, 64, 256].iter() {
                let source = KernelSource::builtin(strategy).with_workgroup_size(size).unwrap();
                let module = validate(&source);
                let entry = module
                    .entry_points
                    .iter()
                    .find(|entry| entry.name == ENTRY_POINT)
                    .unwrap();
                assert_eq!(entry.stage, naga::ShaderStage::Compute);
                assert_eq!(entry.workgroup_size, [size, 1, 1]);
            }
        }
    }

    #[test]
    fn missing_workgroup_declaration_is_a_build_error() {
        let kernel = KernelSource {
            origin: Origin::BuiltIn,
            text: "@compute @workgroup_size(1) fn mandel_iters() {}".to_string(),
        };
        match kernel.with_workgroup_size(32) {
            Err(RenderError::KernelBuild { log }) => assert!(log.contains("WORKGROUP_SIZE")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.wgsl");
        assert!(KernelSource::load(Some(&missing), Strategy::SingleShot).is_err());
    }

    #[test]
    fn reads_kernel_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.wgsl");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "const WORKGROUP_SIZE: u32 = 8u;").unwrap();
        let kernel = KernelSource::load(Some(&path), Strategy::SingleShot).unwrap();
        assert_eq!(kernel.origin, Origin::File(path.clone()));
        assert_eq!(kernel.with_workgroup_size(16).unwrap(), "const WORKGROUP_SIZE: u32 = 16u;\n");
    }
}
