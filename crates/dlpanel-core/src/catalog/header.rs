//! Metadata comments at the top of preset scripts.

/// `# Model:`, `# Description:` and `# Requires-HF-Token:` values of a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptHeader {
    pub name: String,
    pub description: String,
    pub requires_token: bool,
}

/// Display name derived from an item id: `flux_dev` -> `Flux Dev`.
fn fallback_name(id: &str) -> String {
    id.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn parse_header(id: &str, contents: &str) -> ScriptHeader {
    let mut name = None;
    let mut description = String::new();
    let mut requires_token = false;

    for line in contents.lines().map(str::trim) {
        if let Some(v) = line.strip_prefix("# Model:") {
            name = Some(v.trim().to_string()).filter(|n| !n.is_empty());
        } else if let Some(v) = line.strip_prefix("# Description:") {
            description = v.trim().to_string();
        } else if let Some(v) = line.strip_prefix("# Requires-HF-Token:") {
            requires_token = v.trim().eq_ignore_ascii_case("true");
        }
    }

    ScriptHeader {
        name: name.unwrap_or_else(|| fallback_name(id)),
        description,
        requires_token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_all_markers() {
        let h = parse_header(
            "x",
            "#!/bin/bash\n# Model: SDXL Base\n# Description: 1.0 release\n# Requires-HF-Token: TRUE\n",
        );
        assert_eq!(h.name, "SDXL Base");
        assert_eq!(h.description, "1.0 release");
        assert!(h.requires_token);
    }

    #[test]
    fn falls_back_to_title_cased_id() {
        let h = parse_header("flux_DEV_fp8", "aria2c https://e.com/x\n");
        assert_eq!(h.name, "Flux Dev Fp8");
        assert_eq!(h.description, "");
        assert!(!h.requires_token);
    }
}
