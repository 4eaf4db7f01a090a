//! Game metadata read from TDF files
//!
//! - [`UnitInfo`] from `units/*.fbi`
//! - [`MapInfo`] from a map's `.ota`
//! - [`SideInfo`] from `gamedata/sidedata.tdf`

use crate::tdf::{TdfObject, TdfParser};
use crate::vfs::{FileRead, FileSystem, VfsFile};
use crate::{ForgeError, Point2, Result, Size2, ANGULAR_CONSTANT};
use log::debug;
use std::collections::{BTreeSet, HashMap};
use std::f64::consts::PI;
use std::ops::RangeInclusive;

/// Set of unit abilities declared by flag properties
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Capabilities(u32);

impl Capabilities {
    /// `canmove`
    pub const MOVE: Self = Self(1 << 0);
    /// `canstop`
    pub const STOP: Self = Self(1 << 1);
    /// `canattack`
    pub const ATTACK: Self = Self(1 << 2);
    /// `canguard`
    pub const GUARD: Self = Self(1 << 3);
    /// `canpatrol`
    pub const PATROL: Self = Self(1 << 4);
    /// `canreclamate`
    pub const RECLAMATE: Self = Self(1 << 5);
    /// `canload`
    pub const LOAD: Self = Self(1 << 6);
    /// `onoffable`
    pub const ON_OFF: Self = Self(1 << 7);
    /// `activatewhenbuilt`
    pub const ACTIVATE_WHEN_BUILT: Self = Self(1 << 10);
    /// `builder`
    pub const BUILDER: Self = Self(1 << 20);
    /// `canfly`
    pub const FLY: Self = Self(1 << 21);
    /// `floater`
    pub const FLOATER: Self = Self(1 << 22);
    /// `canhover`
    pub const HOVER: Self = Self(1 << 23);
    /// `tidalgenerator`
    pub const TIDAL_GENERATOR: Self = Self(1 << 24);
    /// `istargetingupgrade`
    pub const TARGETING: Self = Self(1 << 25);

    const FLAGS: &'static [(&'static str, Capabilities)] = &[
        ("canmove", Self::MOVE),
        ("canstop", Self::STOP),
        ("canattack", Self::ATTACK),
        ("canguard", Self::GUARD),
        ("canpatrol", Self::PATROL),
        ("canreclamate", Self::RECLAMATE),
        ("canload", Self::LOAD),
        ("onoffable", Self::ON_OFF),
        ("activatewhenbuilt", Self::ACTIVATE_WHEN_BUILT),
        ("builder", Self::BUILDER),
        ("canfly", Self::FLY),
        ("floater", Self::FLOATER),
        ("canhover", Self::HOVER),
        ("tidalgenerator", Self::TIDAL_GENERATOR),
        ("istargetingupgrade", Self::TARGETING),
    ];

    /// Raw bit set
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set the bits of `other`
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    fn from_object(info: &TdfObject) -> Self {
        let mut caps = Self::default();
        for &(key, flag) in Self::FLAGS {
            if info.bool_or(key, false) {
                caps.insert(flag);
            }
        }
        caps
    }
}

/// Static description of a unit type
#[derive(Debug, Clone, PartialEq)]
pub struct UnitInfo {
    /// Internal unit name (`unitname`)
    pub name: String,
    /// Owning side
    pub side: String,
    /// Model name (`objectname`)
    pub object: String,
    /// Feature left behind when destroyed
    pub corpse: Option<String>,
    /// Display name (`name`)
    pub title: String,
    /// Display description
    pub description: String,
    /// Footprint in map cells
    pub footprint: Size2,
    /// Ability flags
    pub capabilities: Capabilities,
    /// Space-separated `category` entries
    pub categories: BTreeSet<String>,
    /// Editor class
    pub ted_class: String,
    /// Acceleration
    pub acceleration: f64,
    /// Top speed
    pub max_velocity: f64,
    /// Braking rate
    pub brake_rate: f64,
    /// Turn rate in radians
    pub turn_rate: f64,
}

impl UnitInfo {
    /// Read the `[UNITINFO]` section of an `.fbi` file
    pub fn load<R: FileRead + ?Sized>(handle: &mut R) -> Result<Self> {
        let mut parser = TdfParser::from_handle(handle)?;
        if !parser.skip_to_object("UNITINFO") {
            return Err(ForgeError::ObjectNotFound("UNITINFO".into()));
        }
        Self::from_object(&parser.extract_object(true))
    }

    /// Build from an extracted `[UNITINFO]` section with lowercased keys
    pub fn from_object(info: &TdfObject) -> Result<Self> {
        let footprint_x = info.required_string("footprintx")?;
        let footprint_z = info.required_string("footprintz")?;

        Ok(Self {
            name: info.required_string("unitname")?,
            object: info.required_string("objectname")?,
            side: info.required_string("side")?,
            title: info.required_string("name")?,
            description: info.required_string("description")?,
            categories: info
                .required_string("category")?
                .split(' ')
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            ted_class: info.required_string("tedclass")?,
            corpse: info.property("corpse").map(str::to_string),
            footprint: Size2::new(
                footprint_x.parse().unwrap_or(1),
                footprint_z.parse().unwrap_or(1),
            ),
            capabilities: Capabilities::from_object(info),
            acceleration: info.numeric_or("acceleration", 0.0),
            max_velocity: info.numeric_or("maxvelocity", 0.0),
            brake_rate: info.numeric_or("brakerate", 0.0),
            turn_rate: info.numeric_or("turnrate", 0.0) / ANGULAR_CONSTANT * (PI / 180.0),
        })
    }

    /// Load every readable `units/*.fbi` in the filesystem
    ///
    /// Files that fail to open or parse are skipped.
    pub fn collect(fs: &FileSystem) -> Vec<UnitInfo> {
        let Some(units) = fs.directory("units") else {
            return Vec::new();
        };

        units
            .files_with_extension("fbi")
            .filter_map(|file| {
                let mut handle = fs.open(file);
                match Self::load(&mut handle) {
                    Ok(unit) => Some(unit),
                    Err(e) => {
                        debug!("Skipping unit {}: {}", file.name(), e);
                        None
                    }
                }
            })
            .collect()
    }

    /// Whether the unit has every capability in `caps`
    pub fn can(&self, caps: Capabilities) -> bool {
        self.capabilities.contains(caps)
    }
}

/// Difficulty of a map schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    /// Free play, also used for network schemas
    Sandbox,
    /// Easy skirmish
    Easy,
    /// Medium skirmish
    Medium,
    /// Hard skirmish
    Hard,
}

impl SchemaKind {
    /// Interpret a schema's `type` value, ignoring case
    pub fn from_value(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::to_lowercase) else {
            return SchemaKind::Sandbox;
        };
        match value.as_str() {
            "easy" => SchemaKind::Easy,
            "medium" => SchemaKind::Medium,
            "hard" => SchemaKind::Hard,
            _ => SchemaKind::Sandbox,
        }
    }
}

/// One playable setup of a map
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Difficulty
    pub kind: SchemaKind,
    /// AI profile name
    pub ai_profile: String,
    /// Start positions in map coordinates; index `n` is `StartPos{n + 1}`
    pub start_positions: Vec<Point2>,
}

impl Schema {
    fn from_object(info: &TdfObject) -> Self {
        Self {
            kind: SchemaKind::from_value(info.property("type")),
            ai_profile: info.string_or("aiprofile", "DEFAULT"),
            start_positions: info
                .object("specials")
                .map(start_positions)
                .unwrap_or_default(),
        }
    }
}

fn start_positions(specials: &TdfObject) -> Vec<Point2> {
    let positions: HashMap<usize, Point2> = specials
        .subobjects
        .iter()
        .filter(|(name, _)| name.starts_with("special"))
        .filter_map(|(_, special)| {
            let number = special
                .property("specialwhat")?
                .strip_prefix("StartPos")?
                .parse::<usize>()
                .ok()?;
            let position = Point2::new(special.numeric_or("xpos", 0), special.numeric_or("zpos", 0));
            Some((number, position))
        })
        .collect();

    let count = positions.keys().copied().max().unwrap_or(0);
    (1..=count)
        .map(|n| positions.get(&n).copied().unwrap_or_default())
        .collect()
}

/// Header of a map's `.ota` file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapInfo {
    /// Mission name
    pub name: String,
    /// Mission description
    pub description: String,
    /// Planet (or Kingdoms world)
    pub planet: Option<String>,
    /// Tidal energy
    pub tidal_strength: i32,
    /// Solar energy
    pub solar_strength: i32,
    /// Wind energy range
    pub wind_speed: RangeInclusive<i32>,
    /// Gravity
    pub gravity: i32,
    /// Playable setups
    pub schemas: Vec<Schema>,
}

impl MapInfo {
    /// Read the `[GlobalHeader]` section; `default_name` is used without a `missionname`
    pub fn load<R: FileRead + ?Sized>(handle: &mut R, default_name: &str) -> Result<Self> {
        let mut parser = TdfParser::from_handle(handle)?;
        if !parser.skip_to_object("GlobalHeader") {
            return Err(ForgeError::ObjectNotFound("GlobalHeader".into()));
        }
        Ok(Self::from_object(&parser.extract_object(true), default_name))
    }

    /// Read the header of an `.ota` file in the filesystem
    pub fn from_file(fs: &FileSystem, ota: &VfsFile) -> Result<Self> {
        let mut handle = fs.open(ota);
        Self::load(&mut handle, ota.base_name())
    }

    /// Build from an extracted `[GlobalHeader]` section with lowercased keys
    pub fn from_object(info: &TdfObject, default_name: &str) -> Self {
        let min_wind: i32 = info.numeric_or("minwindspeed", 0);
        let max_wind: i32 = info.numeric_or("maxwindspeed", 2000);

        Self {
            name: info.string_or("missionname", default_name),
            description: info.string_or("missiondescription", ""),
            planet: info
                .property("planet")
                .or_else(|| info.property("kingdom"))
                .map(str::to_string),
            tidal_strength: info.numeric_or("tidalstrength", 20),
            solar_strength: info.numeric_or("solarstrength", 20),
            wind_speed: min_wind..=max_wind.max(min_wind),
            gravity: info.numeric_or("gravity", 112),
            schemas: schemas(info),
        }
    }
}

fn schemas(info: &TdfObject) -> Vec<Schema> {
    if info.object("Schema 0").is_some() {
        (0..)
            .map_while(|n| info.object(&format!("Schema {n}")))
            .map(Schema::from_object)
            .collect()
    } else {
        // Kingdoms maps carry a single setup
        info.object("Map Data")
            .map(Schema::from_object)
            .into_iter()
            .collect()
    }
}

/// A playable faction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideInfo {
    /// Side name
    pub name: String,
    /// Prefix of the side's unit names
    pub name_prefix: String,
    /// Commander unit
    pub commander: Option<String>,
    /// Side palette
    pub palette: Option<String>,
    /// Every property of the side, with lowercased keys
    pub properties: HashMap<String, String>,
}

impl SideInfo {
    /// Read every `[SIDEn]` section; malformed sides are skipped
    pub fn load_all<R: FileRead + ?Sized>(handle: &mut R) -> Result<Vec<SideInfo>> {
        let mut parser = TdfParser::from_handle(handle)?;
        let mut sides = Vec::new();

        while let Some(section) = parser.skip_to_next_object() {
            let is_side = section
                .get(..4)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("side"));
            if !is_side {
                parser.skip_object();
                continue;
            }

            let info = parser.extract_object(true);
            match Self::from_object(info) {
                Ok(side) => sides.push(side),
                Err(e) => debug!("Skipping side {section}: {e}"),
            }
        }

        Ok(sides)
    }

    fn from_object(info: TdfObject) -> Result<Self> {
        Ok(Self {
            name: info.required_string("name")?,
            name_prefix: info.required_string("nameprefix")?,
            commander: info.property("commander").map(str::to_string),
            palette: info.property("palette").map(str::to_string),
            properties: info.properties,
        })
    }

    /// First side whose name or unit prefix is `name`
    pub fn find<'a>(sides: &'a [SideInfo], name: &str) -> Option<&'a SideInfo> {
        sides
            .iter()
            .find(|side| side.name == name || side.name_prefix == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryHandle;

    const ARMCOM: &str = "[UNITINFO]\r\n{\r\n\tUnitName=ARMCOM;\r\n\tSide=ARM;\r\n\tObjectName=ARMCOM;\r\n\tName=Commander;\r\n\tDescription=Commander;\r\n\tCategory=ARM KBOT LEVEL10  COMMANDER;\r\n\tTEDClass=COMMANDER;\r\n\tFootprintX=2;\r\n\tFootprintZ=x;\r\n\tCanMove=1;\r\n\tCanPatrol=1;\r\n\tBuilder=1;\r\n\tCanFly=0;\r\n\tMaxVelocity=1.2;\r\n\tTurnRate=910;\r\n\tCorpse=armcom_dead;\r\n}\r\n";

    #[test]
    fn test_unit_info() {
        let mut handle = MemoryHandle::new("armcom.fbi", ARMCOM.as_bytes().to_vec());
        let unit = UnitInfo::load(&mut handle).unwrap();

        assert_eq!(unit.name, "ARMCOM");
        assert_eq!(unit.title, "Commander");
        assert_eq!(unit.footprint, Size2::new(2, 1));
        assert_eq!(unit.categories.len(), 4);
        assert!(unit.categories.contains("LEVEL10"));
        assert!(unit.can(Capabilities::MOVE));
        assert!(unit.can(Capabilities::PATROL));
        assert!(unit.can(Capabilities::BUILDER));
        assert!(!unit.can(Capabilities::FLY));
        assert_eq!(unit.corpse.as_deref(), Some("armcom_dead"));
        assert_eq!(unit.max_velocity, 1.2);
        assert!((unit.turn_rate - 5.0f64.to_radians()).abs() < 1e-12);
    }

    #[test]
    fn test_unit_info_missing_key() {
        let text = ARMCOM.replace("\tSide=ARM;\r\n", "");
        let mut handle = MemoryHandle::new("armcom.fbi", text.into_bytes());
        assert!(matches!(
            UnitInfo::load(&mut handle),
            Err(ForgeError::MissingProperty(key)) if key == "side"
        ));

        let mut handle = MemoryHandle::new("empty.fbi", b"[OTHER]{a=1;}".to_vec());
        assert!(matches!(UnitInfo::load(&mut handle), Err(ForgeError::ObjectNotFound(_))));
    }

    const OTA: &str = "[GlobalHeader]\n{\nmissionname=Coast To Coast;\nplanet=Archipelago;\nminwindspeed=3000;\nmaxwindspeed=1000;\ngravity=100;\n\
        [Schema 0]\n{\nType=Network 1;\n[specials]\n{\n[special0]{specialwhat=StartPos2;XPos=100;ZPos=200;}\n[special1]{specialwhat=StartPos3;XPos=300;ZPos=400;}\n[special2]{specialwhat=metal;}\n}\n}\n\
        [Schema 1]\n{\nType=Hard;\nAIProfile=Brutal;\n}\n}\n";

    #[test]
    fn test_map_info() {
        let mut handle = MemoryHandle::new("coast.ota", OTA.as_bytes().to_vec());
        let map = MapInfo::load(&mut handle, "coast").unwrap();

        assert_eq!(map.name, "Coast To Coast");
        assert_eq!(map.planet.as_deref(), Some("Archipelago"));
        assert_eq!(map.wind_speed, 3000..=3000);
        assert_eq!(map.tidal_strength, 20);
        assert_eq!(map.gravity, 100);
        assert_eq!(map.schemas.len(), 2);

        let first = &map.schemas[0];
        assert_eq!(first.kind, SchemaKind::Sandbox);
        assert_eq!(first.ai_profile, "DEFAULT");
        assert_eq!(
            first.start_positions,
            [Point2::new(0, 0), Point2::new(100, 200), Point2::new(300, 400)]
        );
        assert_eq!(map.schemas[1].kind, SchemaKind::Hard);
        assert_eq!(map.schemas[1].ai_profile, "Brutal");
    }

    #[test]
    fn test_map_info_defaults() {
        let mut handle = MemoryHandle::new("x.ota", b"[GlobalHeader]{[Map Data]{type=easy;}}".to_vec());
        let map = MapInfo::load(&mut handle, "x").unwrap();
        assert_eq!(map.name, "x");
        assert_eq!(map.wind_speed, 0..=2000);
        assert_eq!(map.schemas.len(), 1);
        assert_eq!(map.schemas[0].kind, SchemaKind::Easy);
    }

    #[test]
    fn test_side_info() {
        let text = "[SIDE0]{name=ARM;nameprefix=ARM;commander=ARMCOM;}\n\
                    [CANBUILD]{[ARMCOM]{canbuild1=ARMSOLAR;}}\n\
                    [side1]{Name=CORE;NamePrefix=COR;palette=core.pal;}\n\
                    [SIDE2]{name=Broken;}\n";
        let mut handle = MemoryHandle::new("sidedata.tdf", text.as_bytes().to_vec());
        let sides = SideInfo::load_all(&mut handle).unwrap();

        assert_eq!(sides.len(), 2);
        assert_eq!(sides[0].commander.as_deref(), Some("ARMCOM"));
        assert_eq!(sides[1].name, "CORE");
        assert_eq!(sides[1].palette.as_deref(), Some("core.pal"));
        assert_eq!(SideInfo::find(&sides, "COR").map(|s| s.name.as_str()), Some("CORE"));
    }
}
