/// Wavefront MTL material library parser
use crate::error::ParseError;

/// A named material as described by an MTL file. Pure data; GPU textures
/// for its maps are resolved later by file name.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    pub name: String,
    pub ambient: Option<[f32; 3]>,
    pub diffuse: Option<[f32; 3]>,
    pub specular: Option<[f32; 3]>,
    pub ambient_map: Option<String>,
    pub diffuse_map: Option<String>,
    pub specular_map: Option<String>,
}

impl Material {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Materials in the order they were first declared.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Material> {
        self.materials.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    /// Start (or restart) a material. Redeclaring a name resets it in place.
    fn declare(&mut self, name: &str) -> usize {
        match self.materials.iter().position(|m| m.name == name) {
            Some(index) => {
                self.materials[index] = Material::new(name);
                index
            }
            None => {
                self.materials.push(Material::new(name));
                self.materials.len() - 1
            }
        }
    }

    /// Add the materials of another library (e.g. a second `mtllib`). A name
    /// already present is replaced in place.
    pub fn merge(&mut self, other: MaterialLibrary) {
        for material in other.materials {
            match self.materials.iter().position(|m| m.name == material.name) {
                Some(index) => self.materials[index] = material,
                None => self.materials.push(material),
            }
        }
    }

    /// Materials whose diffuse map is exactly `file_name` (case-sensitive).
    pub fn materials_using_diffuse_map<'a>(
        &'a self,
        file_name: &'a str,
    ) -> impl Iterator<Item = &'a Material> + 'a {
        self.materials
            .iter()
            .filter(move |m| m.diffuse_map.as_deref() == Some(file_name))
    }
}

/// `Ka`/`Kd`/`Ks` arguments: one value (grey) or three. `spectral` and
/// `xyz` forms are not supported and yield `None`.
fn parse_color(line: usize, args: &[&str]) -> Result<Option<[f32; 3]>, ParseError> {
    match args.first() {
        Some(&"spectral") | Some(&"xyz") => {
            log::debug!("line {}: ignoring {} color", line, args[0]);
            return Ok(None);
        }
        None => return Err(ParseError::at_line(line, "color needs a value")),
        _ => {}
    }

    let values = args
        .iter()
        .map(|t| {
            t.parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| ParseError::at_line(line, format!("'{}' is not a number", t)))
        })
        .collect::<Result<Vec<f32>, _>>()?;

    match values.as_slice() {
        [grey] => Ok(Some([*grey; 3])),
        [r, g, b, ..] => Ok(Some([*r, *g, *b])),
        _ => Err(ParseError::at_line(line, "color needs 1 or 3 values")),
    }
}

/// Parse MTL text.
///
/// Comments (`#`) and blank lines are skipped, directives are matched
/// case-insensitively, unknown directives are ignored, and any color or map
/// line before the first `newmtl` is a no-op.
pub fn parse_mtl(text: &str) -> Result<MaterialLibrary, ParseError> {
    let mut library = MaterialLibrary::new();
    let mut current: Option<usize> = None;

    for (number, raw_line) in text.lines().enumerate() {
        let line = number + 1;
        let content = raw_line.split('#').next().unwrap_or("").trim();
        let mut tokens = content.split_whitespace();
        let Some(command) = tokens.next() else {
            continue;
        };
        let command = command.to_lowercase();
        let args: Vec<&str> = tokens.collect();

        if command == "newmtl" {
            let name = args.first().ok_or_else(|| {
                ParseError::at_line(line, "newmtl needs a material name")
            })?;
            current = Some(library.declare(name));
            continue;
        }

        let Some(index) = current else {
            log::debug!("line {}: '{}' before any newmtl, ignoring", line, command);
            continue;
        };
        let material = &mut library.materials[index];

        match command.as_str() {
            "ka" => {
                if let Some(color) = parse_color(line, &args)? {
                    material.ambient = Some(color);
                }
            }
            "kd" => {
                if let Some(color) = parse_color(line, &args)? {
                    material.diffuse = Some(color);
                }
            }
            "ks" => {
                if let Some(color) = parse_color(line, &args)? {
                    material.specular = Some(color);
                }
            }
            // File names may contain spaces.
            "map_ka" => material.ambient_map = Some(args.join(" ")),
            "map_kd" => material.diffuse_map = Some(args.join(" ")),
            "map_ks" => material.specular_map = Some(args.join(" ")),
            other => log::debug!("line {}: ignoring MTL directive '{}'", line, other),
        }
    }

    log::info!("Parsed material library: {} materials", library.len());
    Ok(library)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_before_newmtl_is_ignored() {
        let text = "Kd 0.1 0.2 0.3\nnewmtl Foo\nKd 0.5 0.5 0.5\n";
        let library = parse_mtl(text).unwrap();
        assert_eq!(library.len(), 1);
        assert_eq!(library.get("Foo").unwrap().diffuse, Some([0.5, 0.5, 0.5]));
    }

    #[test]
    fn test_full_material() {
        let text = "\
# exported by a tool
newmtl Fur
Ka 0.1 0.1 0.1
KD 0.8 0.4 0.2   # trailing comment
Ks 1
map_Kd fox texture.png
map_Ka ambient.png
map_Ks spec.png
illum 2
Ns 10

newmtl Eyes
Kd 0 0 0
";
        let library = parse_mtl(text).unwrap();
        let names: Vec<_> = library.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["Fur", "Eyes"]);

        let fur = library.get("Fur").unwrap();
        assert_eq!(fur.ambient, Some([0.1, 0.1, 0.1]));
        assert_eq!(fur.diffuse, Some([0.8, 0.4, 0.2]));
        assert_eq!(fur.specular, Some([1.0, 1.0, 1.0]));
        assert_eq!(fur.diffuse_map.as_deref(), Some("fox texture.png"));
        assert_eq!(fur.ambient_map.as_deref(), Some("ambient.png"));
        assert_eq!(fur.specular_map.as_deref(), Some("spec.png"));
        assert_eq!(library.get("Eyes").unwrap().diffuse_map, None);
    }

    #[test]
    fn test_redeclared_material_is_reset_in_place() {
        let text = "newmtl A\nKd 1 0 0\nnewmtl B\nnewmtl A\nKs 0 1 0\n";
        let library = parse_mtl(text).unwrap();
        let first = library.iter().next().unwrap();
        assert_eq!(first.name, "A");
        assert_eq!(first.diffuse, None);
        assert_eq!(first.specular, Some([0.0, 1.0, 0.0]));
    }

    #[test]
    fn test_malformed_color_fails() {
        let err = parse_mtl("newmtl A\nKd red green blue\n").unwrap_err();
        assert!(matches!(err, ParseError::Line { line: 2, .. }));
        assert!(parse_mtl("newmtl A\nKd 1 2\n").is_err());
        assert!(parse_mtl("newmtl\n").is_err());
    }

    #[test]
    fn test_spectral_color_ignored() {
        let library = parse_mtl("newmtl A\nKa spectral file.rfl 1.0\n").unwrap();
        assert_eq!(library.get("A").unwrap().ambient, None);
    }

    #[test]
    fn test_merge_libraries() {
        let mut library = parse_mtl("newmtl A\nKd 1 0 0\nnewmtl B\n").unwrap();
        library.merge(parse_mtl("newmtl C\nnewmtl A\nKd 0 0 1\n").unwrap());
        let names: Vec<_> = library.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(library.get("A").unwrap().diffuse, Some([0.0, 0.0, 1.0]));
    }

    #[test]
    fn test_diffuse_map_lookup_is_exact() {
        let library = parse_mtl("newmtl A\nmap_Kd fox.png\nnewmtl B\nmap_Kd Fox.png\n").unwrap();
        let matches: Vec<_> = library
            .materials_using_diffuse_map("fox.png")
            .map(|m| m.name.as_str())
            .collect();
        assert_eq!(matches, vec!["A"]);
    }
}
