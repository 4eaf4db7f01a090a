use crate::tdf::{TdfObject, TdfParser};
use crate::vfs::{FileRead, FileSystem, Node, VfsDirectory};
use crate::{Result, Size2};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;

const FEATURES_DIRECTORY: &str = "features";
const ALL_WORLDS: &str = "All Worlds";
const CORPSES: &str = "corpses";
const DEFAULT_REMAINS: &str = "smudge01";
const DEFAULT_BURNT: &str = "tree1dead";

/// Feature metadata keyed by lowercased feature name
pub type FeatureCollection = HashMap<String, MapFeatureInfo>;

/// What a destructible feature turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destruction {
    /// Sequence played when destroyed
    pub gaf_item: Option<String>,
    /// Feature left behind, lowercased
    pub remains: String,
}

/// What a reclaimable feature turns into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reclamation {
    /// Sequence played while reclaimed
    pub gaf_item: Option<String>,
    /// Feature left behind, lowercased
    pub remains: String,
}

/// How a flammable feature burns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flammability {
    /// Delay before catching fire
    pub spark_time: i32,
    /// Burn duration range
    pub burn_time: RangeInclusive<i32>,
    /// Chance in percent of spreading to neighbors
    pub spread_chance: i32,
    /// Weapon fired while burning
    pub weapon: String,
    /// Burning sequence
    pub gaf_item: Option<String>,
    /// Burning shadow sequence
    pub shadow_gaf_item: Option<String>,
    /// Feature left behind, lowercased
    pub remains: String,
}

/// Static description of a map feature kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapFeatureInfo {
    /// Section name in its TDF
    pub name: String,
    /// Footprint in map units
    pub footprint: Size2,
    /// Height for collisions
    pub height: i32,
    /// World whose feature palette colors the sprite
    pub world: Option<String>,
    /// GAF file under `anims/`, without extension
    pub gaf_file: Option<String>,
    /// Standing sequence
    pub gaf_item: Option<String>,
    /// Standing shadow sequence
    pub shadow_gaf_item: Option<String>,
    /// Hit density
    pub hit_density: i32,
    /// Damage absorbed before destruction
    pub damage: i32,
    /// Energy yield when reclaimed
    pub energy: i32,
    /// Metal yield when reclaimed
    pub metal: i32,
    /// Whether units path around it
    pub blocking: bool,
    /// Present unless `indestructible`
    pub destructible: Option<Destruction>,
    /// Present with `reclaimable`
    pub reclaimable: Option<Reclamation>,
    /// Present with `flamable`
    pub flammable: Option<Flammability>,
}

impl MapFeatureInfo {
    /// Build from an extracted feature section with lowercased keys
    pub fn from_object(name: &str, info: &TdfObject) -> Self {
        let remains = |key: &str, default: &str| info.string_or(key, default).to_lowercase();
        let optional = |key: &str| info.property(key).map(str::to_string);

        let destructible = (!info.bool_or("indestructible", false)).then(|| Destruction {
            gaf_item: optional("seqnamedie"),
            remains: remains("featuredead", DEFAULT_REMAINS),
        });
        let reclaimable = info.bool_or("reclaimable", false).then(|| Reclamation {
            gaf_item: optional("seqnamereclamate"),
            remains: remains("featurereclamate", DEFAULT_REMAINS),
        });
        let flammable = info.bool_or("flamable", false).then(|| Flammability {
            spark_time: info.numeric_or("sparktime", 4),
            burn_time: info.numeric_or("burnmin", 5)..=info.numeric_or("burnmax", 15),
            spread_chance: info.numeric_or("spreadchance", 90),
            weapon: info.string_or("burnweapon", "TreeBurn"),
            gaf_item: optional("seqnameburn"),
            shadow_gaf_item: optional("seqnameburnshad"),
            remains: remains("featureburnt", DEFAULT_BURNT),
        });

        Self {
            name: name.to_string(),
            footprint: Size2::new(
                info.numeric_or("footprintx", 1),
                info.numeric_or("footprintz", 1),
            ),
            height: info.numeric_or("height", 0),
            world: optional("world"),
            gaf_file: optional("filename"),
            gaf_item: optional("seqname"),
            shadow_gaf_item: optional("seqnameshad"),
            hit_density: info.numeric_or("hitdensity", 1),
            damage: info.numeric_or("damage", 1),
            energy: info.numeric_or("energy", 0),
            metal: info.numeric_or("metal", 0),
            blocking: info.bool_or("blocking", true),
            destructible,
            reclaimable,
            flammable,
        }
    }

    /// Features this one can turn into
    pub fn child_features(&self) -> BTreeSet<String> {
        let destroyed = self.destructible.as_ref().map(|d| &d.remains);
        let reclaimed = self.reclaimable.as_ref().map(|r| &r.remains);
        let burnt = self.flammable.as_ref().map(|f| &f.remains);
        [destroyed, reclaimed, burnt]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Find the metadata for every name in `wanted` and in `corpses`
    ///
    /// The planet's own directory is searched first, then `corpses` (only
    /// when corpses are requested), then `All Worlds`, then every world
    /// until a sweep finds nothing new. Features left behind by a loaded
    /// feature are looked up too. The first definition found wins. Names
    /// are matched without regard to case; unreadable files are skipped.
    pub fn collect(
        fs: &FileSystem,
        wanted: &BTreeSet<String>,
        planet: Option<&str>,
        corpses: &BTreeSet<String>,
    ) -> FeatureCollection {
        let mut loaded = FeatureCollection::new();
        let Some(features) = fs.directory(FEATURES_DIRECTORY) else {
            return loaded;
        };

        let mut pending: BTreeSet<String> = wanted
            .iter()
            .chain(corpses)
            .map(|name| name.to_lowercase())
            .collect();

        let planet_dir = planet
            .filter(|p| !p.is_empty())
            .and_then(|p| features.directory(&planet_directory(p)));
        if let Some(dir) = planet_dir {
            collect_directory(fs, dir, &mut pending, &mut loaded);
        }
        if !corpses.is_empty() {
            if let Some(dir) = features.directory(CORPSES) {
                collect_directory(fs, dir, &mut pending, &mut loaded);
            }
        }
        if pending.is_empty() {
            return loaded;
        }

        if let Some(dir) = features.directory(ALL_WORLDS) {
            collect_directory(fs, dir, &mut pending, &mut loaded);
        }

        while !pending.is_empty() {
            let mut added = 0;
            for dir in features.iter().filter_map(Node::as_directory) {
                added += collect_directory(fs, dir, &mut pending, &mut loaded);
                if pending.is_empty() {
                    break;
                }
            }
            if added == 0 {
                break;
            }
        }

        if !pending.is_empty() {
            debug!("{} features not found: {:?}", pending.len(), pending);
        }
        loaded
    }
}

/// Name of the feature directory holding a planet's features
pub fn planet_directory(planet: &str) -> String {
    match planet.to_lowercase().as_str() {
        "archipelago" => "archi".into(),
        "green planet" => "green".into(),
        "lunar" => "moon".into(),
        "red planet" => "mars".into(),
        "water world" => "water".into(),
        _ => planet.to_string(),
    }
}

fn collect_directory(
    fs: &FileSystem,
    dir: &VfsDirectory,
    pending: &mut BTreeSet<String>,
    loaded: &mut FeatureCollection,
) -> usize {
    let mut count = 0;
    for file in dir.files_with_extension("tdf") {
        let mut handle = fs.open(file);
        match collect_file(&mut handle, pending, loaded) {
            Ok(added) => count += added,
            Err(e) => debug!("Skipping feature file {}: {}", file.name(), e),
        }
    }
    count
}

fn collect_file<R: FileRead + ?Sized>(
    handle: &mut R,
    pending: &mut BTreeSet<String>,
    loaded: &mut FeatureCollection,
) -> Result<usize> {
    let mut parser = TdfParser::from_handle(handle)?;
    let mut count = 0;

    while let Some(section) = parser.skip_to_next_object() {
        let id = section.to_lowercase();
        if !pending.contains(&id) || loaded.contains_key(&id) {
            parser.skip_object();
            continue;
        }

        let info = MapFeatureInfo::from_object(&section, &parser.extract_object(true));
        pending.remove(&id);
        for child in info.child_features() {
            if !loaded.contains_key(&child) {
                pending.insert(child);
            }
        }
        loaded.insert(id, info);
        count += 1;
    }

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryHandle;

    const TREES: &str = "[Tree1]\r\n{\r\n\tworld=greenworld;\r\n\tfilename=trees;\r\n\tseqname=tree1;\r\n\
        \tseqnameshad=tree1shad;\r\n\tfootprintx=1;\r\n\tfootprintz=2;\r\n\theight=30;\r\n\
        \tflamable=1;\r\n\tburnmin=2;\r\n\tburnmax=8;\r\n\tfeatureburnt=Tree1Dead;\r\n\
        \treclaimable=1;\r\n\tenergy=250;\r\n}\r\n\
        [Tree1Dead]\r\n{\r\n\tfootprintx=1;\r\n\tfootprintz=1;\r\n\tindestructible=1;\r\n\tblocking=0;\r\n}\r\n\
        [Boulder]\r\n{\r\n\tmetal=40;\r\n\tfeaturedead=BoulderRubble;\r\n}\r\n";

    #[test]
    fn test_from_object() {
        let mut parser = TdfParser::new(TREES);
        assert!(parser.skip_to_object("tree1"));
        let tree = MapFeatureInfo::from_object("Tree1", &parser.extract_object(true));

        assert_eq!(tree.footprint, Size2::new(1, 2));
        assert_eq!(tree.height, 30);
        assert_eq!(tree.gaf_file.as_deref(), Some("trees"));
        assert_eq!(tree.energy, 250);
        assert!(tree.blocking);

        let burning = tree.flammable.as_ref().unwrap();
        assert_eq!(burning.burn_time, 2..=8);
        assert_eq!(burning.spread_chance, 90);
        assert_eq!(burning.remains, "tree1dead");
        assert_eq!(tree.destructible.as_ref().unwrap().remains, "smudge01");
        assert_eq!(
            tree.child_features().into_iter().collect::<Vec<_>>(),
            ["smudge01", "tree1dead"]
        );
    }

    #[test]
    fn test_collect_file_follows_remains() {
        let mut handle = MemoryHandle::new("trees.tdf", TREES.as_bytes().to_vec());
        let mut pending: BTreeSet<String> = ["tree1".to_string()].into();
        let mut loaded = FeatureCollection::new();

        let added = collect_file(&mut handle, &mut pending, &mut loaded).unwrap();

        // Tree1Dead follows Tree1 in the same file and is picked up in one pass
        assert_eq!(added, 2);
        assert!(loaded["tree1dead"].destructible.is_none());
        assert!(!loaded["tree1dead"].blocking);
        assert!(!loaded.contains_key("boulder"));
        assert_eq!(pending.into_iter().collect::<Vec<_>>(), ["smudge01"]);
    }

    #[test]
    fn test_planet_directories() {
        assert_eq!(planet_directory("Green Planet"), "green");
        assert_eq!(planet_directory("Archipelago"), "archi");
        assert_eq!(planet_directory("Crystal"), "Crystal");
    }
}
