//! Whitelist and ignore-pattern gate for in-archive paths
//!
//! GMA archives only ever carry a fixed set of file kinds. The whitelist is a
//! list of glob patterns (`*` matches any run of characters, `?` exactly one)
//! matched case-insensitively against the whole relative path. An addon can
//! additionally exclude otherwise-whitelisted paths through its own ignore
//! patterns, which use the same glob dialect.

use crate::error::{GmadError, Result};
use regex::RegexBuilder;

/// The one member name an archive can never contain; the project metadata
/// file is merged into the description field instead of being stored.
pub const RESERVED_METADATA_NAME: &str = "addon.json";

/// Fixed glob patterns of every file kind allowed in an archive, in the
/// order they are consulted by [`best_match_substring`].
pub const WILDCARD: &[&str] = &[
    "lua/*.lua",
    "scenes/*.vcd",
    "particles/*.pcf",
    "resource/fonts/*.ttf",
    "scripts/vehicles/*.txt",
    "resource/localization/*/*.properties",
    "maps/*.bsp",
    "maps/*.nav",
    "maps/*.ain",
    "maps/thumb/*.png",
    "sound/*.wav",
    "sound/*.mp3",
    "sound/*.ogg",
    "materials/*.vmt",
    "materials/*.vtf",
    "materials/*.png",
    "materials/*.jpg",
    "materials/*.jpeg",
    "models/*.mdl",
    "models/*.vtx",
    "models/*.phy",
    "models/*.ani",
    "models/*.vvd",
    "gamemodes/*/*.txt",
    "gamemodes/*/*.fgd",
    "gamemodes/*/logo.png",
    "gamemodes/*/icon24.png",
    "gamemodes/*/gamemode/*.lua",
    "gamemodes/*/entities/effects/*.lua",
    "gamemodes/*/entities/weapons/*.lua",
    "gamemodes/*/entities/entities/*.lua",
    "gamemodes/*/backgrounds/*.png",
    "gamemodes/*/backgrounds/*.jpg",
    "gamemodes/*/backgrounds/*.jpeg",
    "gamemodes/*/content/models/*.mdl",
    "gamemodes/*/content/models/*.vtx",
    "gamemodes/*/content/models/*.phy",
    "gamemodes/*/content/models/*.ani",
    "gamemodes/*/content/models/*.vvd",
    "gamemodes/*/content/materials/*.vmt",
    "gamemodes/*/content/materials/*.vtf",
    "gamemodes/*/content/materials/*.png",
    "gamemodes/*/content/materials/*.jpg",
    "gamemodes/*/content/materials/*.jpeg",
    "gamemodes/*/content/scenes/*.vcd",
    "gamemodes/*/content/particles/*.pcf",
    "gamemodes/*/content/resource/fonts/*.ttf",
    "gamemodes/*/content/scripts/vehicles/*.txt",
    "gamemodes/*/content/resource/localization/*/*.properties",
    "gamemodes/*/content/maps/*.bsp",
    "gamemodes/*/content/maps/*.nav",
    "gamemodes/*/content/maps/*.ain",
    "gamemodes/*/content/maps/thumb/*.png",
    "gamemodes/*/content/sound/*.wav",
    "gamemodes/*/content/sound/*.mp3",
    "gamemodes/*/content/sound/*.ogg",
];

/// Whitelist patterns grouped by file kind, for collaborator UIs that offer
/// per-kind file pickers.
pub const PATTERN_GROUPS: &[(&str, &[&str])] = &[
    ("Map files", &["*.bsp", "*.png", "*.nav", "*.ain", "*.fgd"]),
    ("Lua scripts", &["*.lua"]),
    ("Materials", &["*.vmt", "*.vtf", "*.png"]),
    ("Models", &["*.mdl", "*.vtx", "*.phy", "*.ani", "*.vvd"]),
    ("Text files", &["*.txt"]),
    ("Fonts", &["*.ttf"]),
    ("Images", &["*.png", "*.jpg", "*.jpeg"]),
    ("Scenes", &["*.vcd"]),
    ("Particle effects", &["*.pcf"]),
    ("Localization properties", &["*.properties"]),
    ("Sounds", &["*.wav", "*.mp3", "*.ogg"]),
];

/// Extension to human-readable file kind, for listings.
pub const FILE_TYPES: &[(&str, &str)] = &[
    ("bsp", "Source Map file"),
    ("nav", "Navigation mesh"),
    ("ain", "AI node-graph"),
    ("fgd", "Hammer game definitions"),
    ("lua", "Lua script"),
    ("vmt", "Material file"),
    ("vtf", "Texture file"),
    ("mdl", "Model"),
    ("vtx", "Hardware-specific material compilation"),
    ("phy", "Model physics"),
    ("ani", "Model animations"),
    ("vvd", "Model vertex data"),
    ("txt", "Text document"),
    ("ttf", "True-Type font"),
    ("png", "Portable Network Graphics image"),
    ("jpg", "JPEG image"),
    ("jpeg", "JPEG image"),
    ("vcd", "Choreography data"),
    ("pcf", "Particle effect"),
    ("properties", "Localization property"),
    ("wav", "Waveform sound"),
    ("mp3", "MP3 music"),
    ("ogg", "OGG Vorbis audio"),
];

/// Look up the human-readable kind for a file extension.
pub fn file_type_description(extension: &str) -> Option<&'static str> {
    let extension = extension.to_lowercase();
    FILE_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, desc)| *desc)
}

/// Whether policy checks are enforced for a given call.
///
/// Carried as an explicit parameter instead of process-global state so that
/// two sessions opened in the same process never interfere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    /// Normal operation: every path must pass the whitelist gate.
    #[default]
    Enforced,
    /// The caller explicitly accepted a non-conforming archive; the
    /// whitelist gate is skipped entirely.
    Overridden,
}

/// Translate a glob pattern into an anchored, case-insensitive regex.
fn glob_regex(pattern: &str, anchored: bool) -> regex::Regex {
    let escaped = regex::escape(pattern).replace(r"\*", ".*").replace(r"\?", ".");
    let source = if anchored {
        format!("^{escaped}$")
    } else {
        escaped
    };

    RegexBuilder::new(&source)
        .case_insensitive(true)
        .build()
        .expect("escaped glob translates to a valid regex")
}

/// Check a path against a single glob pattern (whole-string match).
pub fn matches(pattern: &str, path: &str) -> bool {
    glob_regex(pattern, true).is_match(path)
}

/// Whether the path matches any fixed whitelist pattern.
///
/// [`PolicyMode::Overridden`] makes every path pass.
pub fn is_whitelisted(path: &str, mode: PolicyMode) -> bool {
    mode == PolicyMode::Overridden || WILDCARD.iter().any(|pattern| matches(pattern, path))
}

/// Whether the path matches any of the addon's own ignore patterns.
pub fn is_ignored(path: &str, ignore_patterns: &[String]) -> bool {
    ignore_patterns.iter().any(|pattern| matches(pattern, path))
}

/// Return the substring of `path` matched by the first fixed pattern that
/// matches at all.
///
/// Lets callers discover the canonical in-archive path of a file dropped in
/// with surrounding directories, e.g. `/home/me/addon/lua/init.lua` yields
/// `lua/init.lua`.
pub fn best_match_substring(path: &str) -> Option<String> {
    WILDCARD.iter().find_map(|pattern| {
        glob_regex(pattern, false)
            .find(path)
            .map(|m| m.as_str().to_string())
    })
}

/// Composite gate run before a path enters an archive.
///
/// An empty path is structurally invalid and rejected in either mode.
/// `PolicyMode::Overridden` skips the rest of the gate; the duplicate-path
/// check lives at the archive layer and is never skipped.
pub fn check(path: &str, ignore_patterns: &[String], mode: PolicyMode) -> Result<()> {
    if path.is_empty() {
        return Err(GmadError::EmptyPath);
    }
    if mode == PolicyMode::Overridden {
        return Ok(());
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(GmadError::PathTraversal(path.to_string()));
    }
    if path == RESERVED_METADATA_NAME {
        return Err(GmadError::ReservedName(path.to_string()));
    }
    if is_ignored(path, ignore_patterns) {
        return Err(GmadError::Ignored(path.to_string()));
    }
    if !is_whitelisted(path, mode) {
        return Err(GmadError::NotWhitelisted(path.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_pattern_match() {
        assert!(matches("lua/*.lua", "lua/autorun/init.lua"));
        assert!(matches("lua/*.lua", "LUA/INIT.LUA"));
        assert!(!matches("lua/*.lua", "materials/foo.png"));
        assert!(matches("maps/thumb/*.png", "maps/thumb/a.png"));
    }

    #[test]
    fn test_question_mark_matches_one() {
        assert!(matches("lua/?.lua", "lua/a.lua"));
        assert!(!matches("lua/?.lua", "lua/ab.lua"));
    }

    #[test]
    fn test_is_whitelisted() {
        assert!(is_whitelisted("lua/init.lua", PolicyMode::Enforced));
        assert!(is_whitelisted("gamemodes/rp/gamemode/cl_init.lua", PolicyMode::Enforced));
        assert!(!is_whitelisted("random/file.exe", PolicyMode::Enforced));
        assert!(is_whitelisted("random/file.exe", PolicyMode::Overridden));
    }

    #[test]
    fn test_is_ignored() {
        let ignores = vec!["*.psd".to_string(), "materials/src/*".to_string()];
        assert!(is_ignored("art.psd", &ignores));
        assert!(is_ignored("materials/src/raw.vtf", &ignores));
        assert!(!is_ignored("materials/final.vtf", &ignores));
    }

    #[test]
    fn test_best_match_substring() {
        assert_eq!(
            best_match_substring("/home/dev/myaddon/lua/autorun/hello.lua"),
            Some("lua/autorun/hello.lua".to_string())
        );
        assert_eq!(best_match_substring("notes/readme.md"), None);
    }

    #[test]
    fn test_check_gate_errors() {
        assert!(matches!(
            check("", &[], PolicyMode::Enforced),
            Err(GmadError::EmptyPath)
        ));
        assert!(matches!(
            check("../etc/passwd", &[], PolicyMode::Enforced),
            Err(GmadError::PathTraversal(_))
        ));
        assert!(matches!(
            check("addon.json", &[], PolicyMode::Enforced),
            Err(GmadError::ReservedName(_))
        ));
        assert!(matches!(
            check("random/file.exe", &[], PolicyMode::Enforced),
            Err(GmadError::NotWhitelisted(_))
        ));
        assert!(check("lua/init.lua", &[], PolicyMode::Enforced).is_ok());
    }

    #[test]
    fn test_check_gate_ignore_patterns() {
        let ignores = vec!["lua/secret/*".to_string()];
        assert!(matches!(
            check("lua/secret/api.lua", &ignores, PolicyMode::Enforced),
            Err(GmadError::Ignored(_))
        ));
        assert!(check("lua/public/api.lua", &ignores, PolicyMode::Enforced).is_ok());
    }

    #[test]
    fn test_override_skips_gate_except_empty_path() {
        assert!(check("random/file.exe", &[], PolicyMode::Overridden).is_ok());
        assert!(check("../escape.lua", &[], PolicyMode::Overridden).is_ok());
        assert!(matches!(
            check("", &[], PolicyMode::Overridden),
            Err(GmadError::EmptyPath)
        ));
    }

    #[test]
    fn test_file_type_description() {
        assert_eq!(file_type_description("lua"), Some("Lua script"));
        assert_eq!(file_type_description("MDL"), Some("Model"));
        assert_eq!(file_type_description("exe"), None);
    }
}
