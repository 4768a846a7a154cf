use super::Format;

/// File extensions for one format's code and declaration output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutExtension {
    pub js: &'static str,
    pub dts: &'static str,
}

/// Default output-extension policy.
///
/// `.js`/`.d.ts` unless the format disagrees with the package's module type:
/// cjs inside a `"type": "module"` package gets `.cjs`, esm inside a CommonJS
/// package gets `.mjs`. iife output is always `.global.js`.
pub fn default_out_extension(format: Format, package_type: Option<&str>) -> OutExtension {
    let is_module = package_type == Some("module");
    match format {
        Format::Cjs if is_module => OutExtension {
            js: ".cjs",
            dts: ".d.cts",
        },
        Format::Esm if !is_module => OutExtension {
            js: ".mjs",
            dts: ".d.mts",
        },
        Format::Iife => OutExtension {
            js: ".global.js",
            dts: ".d.ts",
        },
        _ => OutExtension {
            js: ".js",
            dts: ".d.ts",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cjs_in_module_package() {
        let ext = default_out_extension(Format::Cjs, Some("module"));
        assert_eq!((ext.js, ext.dts), (".cjs", ".d.cts"));
    }

    #[test]
    fn esm_without_package_type() {
        let ext = default_out_extension(Format::Esm, None);
        assert_eq!((ext.js, ext.dts), (".mjs", ".d.mts"));
    }

    #[test]
    fn iife_ignores_package_type() {
        for pkg in [None, Some("module"), Some("commonjs")] {
            assert_eq!(default_out_extension(Format::Iife, pkg).js, ".global.js");
        }
    }

    #[test]
    fn matching_module_type_keeps_plain_extensions() {
        let esm = default_out_extension(Format::Esm, Some("module"));
        assert_eq!((esm.js, esm.dts), (".js", ".d.ts"));
        let cjs = default_out_extension(Format::Cjs, Some("commonjs"));
        assert_eq!((cjs.js, cjs.dts), (".js", ".d.ts"));
    }
}
