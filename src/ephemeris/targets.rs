//! Planets and their moons as Horizons targets
//!
//! Targets are grouped by planet system. An exposure names the body HST was
//! pointed at (the header TARGNAME, e.g. `JUP-IO-1`), and every member of the
//! matching system becomes a target for that exposure.

use lazy_static::lazy_static;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::{FinderError, Result};

/// A solar-system body known to Horizons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Lowercase body name, used as the catalog key
    pub name: String,
    /// Horizons COMMAND id, e.g. `501` for Io
    pub horizons_id: String,
    /// Lowercase name of the planet whose system the body belongs to
    pub planet: String,
}

/// Pairs of (horizons id, name, planet) for the built-in systems
const TARGET_SYSTEMS: &[(&str, &str, &str)] = &[
    ("499", "mars", "mars"),
    ("401", "phobos", "mars"),
    ("402", "deimos", "mars"),
    ("599", "jupiter", "jupiter"),
    ("501", "io", "jupiter"),
    ("502", "europa", "jupiter"),
    ("503", "ganymede", "jupiter"),
    ("504", "callisto", "jupiter"),
    ("505", "amalthea", "jupiter"),
    ("506", "himalia", "jupiter"),
    ("514", "thebe", "jupiter"),
    ("515", "adrastea", "jupiter"),
    ("516", "metis", "jupiter"),
    ("699", "saturn", "saturn"),
    ("601", "mimas", "saturn"),
    ("602", "enceladus", "saturn"),
    ("603", "tethys", "saturn"),
    ("604", "dione", "saturn"),
    ("605", "rhea", "saturn"),
    ("606", "titan", "saturn"),
    ("607", "hyperion", "saturn"),
    ("608", "iapetus", "saturn"),
    ("609", "phoebe", "saturn"),
    ("610", "janus", "saturn"),
    ("611", "epimetheus", "saturn"),
    ("616", "prometheus", "saturn"),
    ("617", "pandora", "saturn"),
    ("799", "uranus", "uranus"),
    ("701", "ariel", "uranus"),
    ("702", "umbriel", "uranus"),
    ("703", "titania", "uranus"),
    ("704", "oberon", "uranus"),
    ("705", "miranda", "uranus"),
    ("715", "puck", "uranus"),
    ("899", "neptune", "neptune"),
    ("801", "triton", "neptune"),
    ("802", "nereid", "neptune"),
    ("808", "proteus", "neptune"),
    ("999", "pluto", "pluto"),
    ("901", "charon", "pluto"),
];

lazy_static! {
    static ref BUILTIN: TargetCatalog = TargetCatalog::from_targets(
        TARGET_SYSTEMS
            .iter()
            .map(|&(id, name, planet)| Target {
                name: name.to_string(),
                horizons_id: id.to_string(),
                planet: planet.to_string(),
            })
            .collect()
    );
}

/// Targets grouped by planet system
#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    systems: BTreeMap<String, Vec<Target>>,
}

impl TargetCatalog {
    /// The built-in Mars, Jupiter, Saturn, Uranus, Neptune and Pluto systems
    pub fn builtin() -> Self {
        BUILTIN.clone()
    }

    pub fn from_targets(targets: Vec<Target>) -> Self {
        let mut systems: BTreeMap<String, Vec<Target>> = BTreeMap::new();
        for target in targets {
            systems.entry(target.planet.clone()).or_default().push(target);
        }
        TargetCatalog { systems }
    }

    /// Parse a system list
    ///
    /// Each line is `<horizons id> <name> [...]`; a blank line ends a system and
    /// the last word of a system's first line names its planet. Lines starting
    /// with `#` are ignored.
    ///
    /// ```text
    /// 599 jupiter jupiter
    /// 501 io
    /// 502 europa
    ///
    /// 699 saturn saturn
    /// 606 titan
    /// ```
    pub fn parse(text: &str) -> Result<Self> {
        let mut targets = Vec::new();
        let mut planet: Option<String> = None;

        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            if line.is_empty() {
                planet = None;
                continue;
            }

            let words: Vec<&str> = line.split_whitespace().collect();
            if words.len() < 2 {
                return Err(FinderError::Config(format!(
                    "target list line {}: expected '<id> <name>', got {:?}",
                    number + 1,
                    line
                )));
            }
            let system = planet
                .get_or_insert_with(|| words[words.len() - 1].to_lowercase())
                .clone();
            targets.push(Target {
                name: words[1].to_lowercase(),
                horizons_id: words[0].to_string(),
                planet: system,
            });
        }

        if targets.is_empty() {
            return Err(FinderError::Config("target list is empty".to_string()));
        }
        Ok(Self::from_targets(targets))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::parse(&text)
    }

    /// Planet names, sorted
    pub fn planets(&self) -> impl Iterator<Item = &str> {
        self.systems.keys().map(String::as_str)
    }

    /// Members of one planet system
    pub fn system(&self, planet: &str) -> Option<&[Target]> {
        self.systems.get(planet).map(Vec::as_slice)
    }

    pub fn find(&self, name: &str) -> Option<&Target> {
        let name = name.to_lowercase();
        self.systems
            .values()
            .flatten()
            .find(|target| target.name == name)
    }

    /// Planet system named by an exposure TARGNAME
    ///
    /// Only the part before the first `-` is used. It matches, in order: a
    /// body name exactly, the start of a planet name, the start of a body
    /// name. Prefixes shorter than two characters never match.
    pub fn resolve_system(&self, targname: &str) -> Result<&str> {
        let token = targname
            .trim()
            .to_lowercase()
            .split('-')
            .next()
            .unwrap_or_default()
            .to_string();
        let unknown = || FinderError::UnknownTarget(targname.to_string());
        if token.len() < 2 {
            return Err(unknown());
        }

        if let Some(target) = self.find(&token) {
            return Ok(self.planet_key(&target.planet));
        }
        if let Some(planet) = self.planets().find(|planet| planet.starts_with(&token)) {
            return Ok(planet);
        }
        self.systems
            .values()
            .flatten()
            .find(|target| target.name.starts_with(&token))
            .map(|target| self.planet_key(&target.planet))
            .ok_or_else(unknown)
    }

    /// Targets for an exposure TARGNAME
    pub fn targets_for(&self, targname: &str) -> Result<&[Target]> {
        let planet = self.resolve_system(targname)?;
        self.system(planet)
            .ok_or_else(|| FinderError::UnknownTarget(targname.to_string()))
    }

    fn planet_key(&self, planet: &str) -> &str {
        self.systems
            .get_key_value(planet)
            .map(|(key, _)| key.as_str())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("JUP-IO-1", "jupiter")]
    #[case("jupiter", "jupiter")]
    #[case("GANY-CENTER", "jupiter")]
    #[case("SAT-RINGS", "saturn")]
    #[case("titan", "saturn")]
    #[case("titania", "uranus")]
    #[case("io", "jupiter")]
    fn test_resolve_system(#[case] targname: &str, #[case] planet: &str) {
        let catalog = TargetCatalog::builtin();
        assert_eq!(catalog.resolve_system(targname).unwrap(), planet);
    }

    #[rstest]
    #[case("COMET-SL9")]
    #[case("")]
    #[case("x-1")]
    fn test_unknown_targname(#[case] targname: &str) {
        let catalog = TargetCatalog::builtin();
        assert!(matches!(
            catalog.resolve_system(targname),
            Err(FinderError::UnknownTarget(_))
        ));
    }

    #[test]
    fn test_builtin_jupiter_system() {
        let catalog = TargetCatalog::builtin();
        let jupiter = catalog.targets_for("JUP-IO").unwrap();
        assert!(jupiter.iter().any(|t| t.name == "io" && t.horizons_id == "501"));
        assert!(jupiter.iter().any(|t| t.name == "jupiter" && t.horizons_id == "599"));
        assert!(jupiter.iter().all(|t| t.planet == "jupiter"));
    }

    #[test]
    fn test_parse_system_list() {
        let text = "\
# planets and moons
599 Jupiter jupiter
501 Io
502 Europa

699 Saturn saturn
606 Titan
";
        let catalog = TargetCatalog::parse(text).unwrap();
        assert_eq!(catalog.planets().collect::<Vec<_>>(), vec!["jupiter", "saturn"]);
        assert_eq!(catalog.system("jupiter").unwrap().len(), 3);

        let titan = catalog.find("Titan").unwrap();
        assert_eq!(titan.horizons_id, "606");
        assert_eq!(titan.planet, "saturn");
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(TargetCatalog::parse("599\n").is_err());
        assert!(TargetCatalog::parse("\n# nothing here\n").is_err());
    }
}
