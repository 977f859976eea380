use std::collections::BTreeMap;

use shared::{Cell, Grid, ModuleEntry};
use tracing::{info, warn};
use url::Url;

use crate::{
    context::{PLATFORM_PARAM, SHARED_GRID_PARAM},
    error::ShareError,
    grid_store::GridStore,
    recommended_build::ModuleCatalog,
};

/// Upper bound on `width * height` accepted from a link.
pub const MAX_SHARED_CELLS: usize = 1024;

const SECTION_SEPARATOR: char = '|';
const EMPTY_CODE: char = ' ';
const INACTIVE: char = 'I';
const ACTIVE: char = 'A';
const SUPERCHARGED: char = 'S';
const ADJACENT: char = 'T';
const NOT_ADJACENT: char = 'F';

/// Serializes the grid into the compact share payload:
///
/// `WxH|states|techs|modules|adjacency|techMap|moduleMap`
///
/// The four per-cell sections hold one character per cell in row-major
/// order and are run-length encoded. Tech and module names are replaced by
/// one-letter codes listed in the two trailing `code:name` maps.
pub fn serialize_grid(grid: &Grid) -> Result<String, ShareError> {
    let mut techs = CodeTable::default();
    let mut modules = CodeTable::default();
    let cell_count = grid.width * grid.height;
    let mut states = String::with_capacity(cell_count);
    let mut tech_codes = String::with_capacity(cell_count);
    let mut module_codes = String::with_capacity(cell_count);
    let mut adjacency = String::with_capacity(cell_count);

    for cell in grid.iter() {
        states.push(match (cell.active, cell.supercharged) {
            (false, _) => INACTIVE,
            (true, false) => ACTIVE,
            (true, true) => SUPERCHARGED,
        });
        match (&cell.tech, &cell.module) {
            (Some(tech), Some(module)) => {
                tech_codes.push(techs.code_for(tech)?);
                module_codes.push(modules.code_for(module)?);
            }
            _ => {
                tech_codes.push(EMPTY_CODE);
                module_codes.push(EMPTY_CODE);
            }
        }
        adjacency.push(if cell.adjacency_bonus > 0.0 {
            ADJACENT
        } else {
            NOT_ADJACENT
        });
    }

    Ok([
        format!("{}x{}", grid.width, grid.height),
        compress_rle(&states),
        compress_rle(&tech_codes),
        compress_rle(&module_codes),
        compress_rle(&adjacency),
        techs.encode(),
        modules.encode(),
    ]
    .join(SECTION_SEPARATOR.to_string().as_str()))
}

/// Rebuilds a grid from a share payload. Placed modules are resolved through
/// `catalog`; a module the catalog does not know becomes an empty cell that
/// keeps its active and supercharged flags.
pub fn deserialize_grid(payload: &str, catalog: &ModuleCatalog) -> Result<Grid, ShareError> {
    let sections: Vec<&str> = payload.split(SECTION_SEPARATOR).collect();
    let [dimensions, states, tech_codes, module_codes, adjacency, tech_map, module_map] =
        sections.as_slice()
    else {
        return Err(ShareError::Malformed(format!(
            "expected 7 sections, found {}",
            sections.len()
        )));
    };

    let (width, height) = parse_dimensions(dimensions)?;
    let cell_count = width * height;
    let states = decompress_section("states", states, cell_count)?;
    let tech_codes = decompress_section("techs", tech_codes, cell_count)?;
    let module_codes = decompress_section("modules", module_codes, cell_count)?;
    let adjacency = decompress_section("adjacency", adjacency, cell_count)?;
    let tech_names = parse_code_map("tech map", tech_map)?;
    let module_names = parse_code_map("module map", module_map)?;

    let mut grid = Grid::new(width, height);
    for (index, cell) in grid.iter_mut().enumerate() {
        let (active, supercharged) = match states[index] {
            INACTIVE => (false, false),
            ACTIVE => (true, false),
            SUPERCHARGED => (true, true),
            other => {
                return Err(ShareError::Malformed(format!(
                    "unknown cell state '{other}' at cell {index}"
                )))
            }
        };
        let adjacency_bonus = match adjacency[index] {
            ADJACENT => 1.0,
            NOT_ADJACENT => 0.0,
            other => {
                return Err(ShareError::Malformed(format!(
                    "unknown adjacency flag '{other}' at cell {index}"
                )))
            }
        };

        *cell = match (tech_codes[index], module_codes[index]) {
            (EMPTY_CODE, EMPTY_CODE) => Cell::empty(supercharged, active),
            (EMPTY_CODE, _) | (_, EMPTY_CODE) => {
                return Err(ShareError::Malformed(format!(
                    "cell {index} names only one of tech and module"
                )))
            }
            (tech_code, module_code) => {
                let tech = lookup(&tech_names, tech_code, "tech")?;
                let module = lookup(&module_names, module_code, "module")?;
                resolve(catalog, tech, module, active, supercharged)
            }
        };
        if cell.has_module() {
            cell.adjacency_bonus = adjacency_bonus;
        }
    }
    Ok(grid)
}

/// Opens a shared grid: the decoded grid replaces the current one and the
/// store enters shared mode. A payload that does not decode leaves the grid
/// alone.
pub fn apply_shared_grid(
    store: &mut GridStore,
    catalog: &ModuleCatalog,
    payload: &str,
) -> Result<(), ShareError> {
    let grid = deserialize_grid(payload, catalog)?;
    store.set_grid(grid);
    store.set_is_shared_grid(true);
    info!(platform = %store.platform(), "opened shared grid");
    Ok(())
}

/// Link that reopens the store's grid on its platform.
pub fn share_url(base: &str, store: &GridStore) -> Result<String, ShareError> {
    let mut url = Url::parse(base)?;
    let payload = serialize_grid(store.grid())?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != PLATFORM_PARAM && key != SHARED_GRID_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(PLATFORM_PARAM, store.platform())
        .append_pair(SHARED_GRID_PARAM, &payload);
    Ok(url.into())
}

/// Run-length encoding: each run is its character followed by the run
/// length when the run is longer than one. `AAABBCDDDD` becomes `A3B2CD4`.
pub fn compress_rle(input: &str) -> String {
    let mut output = String::new();
    let mut chars = input.chars().peekable();
    while let Some(current) = chars.next() {
        let mut run = 1;
        while chars.next_if_eq(&current).is_some() {
            run += 1;
        }
        output.push(current);
        if run > 1 {
            output.push_str(&run.to_string());
        }
    }
    output
}

/// Inverse of [`compress_rle`]. Fails on a leading count, a zero count or
/// output longer than `limit` characters.
pub fn decompress_rle(input: &str, limit: usize) -> Result<String, ShareError> {
    let mut output = String::new();
    let mut produced = 0usize;
    let mut chars = input.chars().peekable();
    while let Some(current) = chars.next() {
        if current.is_ascii_digit() {
            return Err(ShareError::Malformed(format!(
                "run length '{current}' has no character"
            )));
        }
        let mut digits = String::new();
        while let Some(digit) = chars.next_if(char::is_ascii_digit) {
            digits.push(digit);
        }
        let run = if digits.is_empty() {
            1
        } else {
            digits
                .parse::<usize>()
                .ok()
                .filter(|run| *run > 0)
                .ok_or_else(|| ShareError::Malformed(format!("invalid run length '{digits}'")))?
        };
        produced = produced.saturating_add(run);
        if produced > limit {
            return Err(ShareError::Malformed(format!(
                "expands past {limit} characters"
            )));
        }
        output.extend(std::iter::repeat(current).take(run));
    }
    Ok(output)
}

fn parse_dimensions(raw: &str) -> Result<(usize, usize), ShareError> {
    let parsed = raw
        .split_once('x')
        .and_then(|(width, height)| Some((width.parse::<usize>().ok()?, height.parse::<usize>().ok()?)));
    match parsed {
        Some((width, height))
            if width > 0
                && height > 0
                && width
                    .checked_mul(height)
                    .is_some_and(|cells| cells <= MAX_SHARED_CELLS) =>
        {
            Ok((width, height))
        }
        _ => Err(ShareError::Malformed(format!("invalid dimensions '{raw}'"))),
    }
}

fn decompress_section(name: &str, raw: &str, cells: usize) -> Result<Vec<char>, ShareError> {
    let expanded: Vec<char> = decompress_rle(raw, cells)?.chars().collect();
    if expanded.len() != cells {
        return Err(ShareError::Malformed(format!(
            "{name} section holds {} cells, expected {cells}",
            expanded.len()
        )));
    }
    Ok(expanded)
}

fn parse_code_map(name: &str, raw: &str) -> Result<BTreeMap<char, String>, ShareError> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').filter(|entry| !entry.is_empty()) {
        let parsed = entry.split_once(':').and_then(|(code, value)| {
            let mut chars = code.chars();
            match (chars.next(), chars.next()) {
                (Some(code), None) if !value.is_empty() => Some((code, value)),
                _ => None,
            }
        });
        let Some((code, value)) = parsed else {
            return Err(ShareError::Malformed(format!("{name} entry '{entry}'")));
        };
        map.insert(code, value.to_string());
    }
    Ok(map)
}

fn lookup<'a>(
    names: &'a BTreeMap<char, String>,
    code: char,
    kind: &str,
) -> Result<&'a str, ShareError> {
    names
        .get(&code)
        .map(String::as_str)
        .ok_or_else(|| ShareError::Malformed(format!("{kind} code '{code}' is not in its map")))
}

fn resolve(
    catalog: &ModuleCatalog,
    tech: &str,
    module: &str,
    active: bool,
    supercharged: bool,
) -> Cell {
    let Some(entry) = catalog.get(tech, module) else {
        warn!(%tech, %module, "shared grid references an unknown module; leaving cell empty");
        return Cell::empty(supercharged, active);
    };
    let mut cell = Cell::from_catalog_entry(&ModuleEntry {
        id: Some(module.to_string()),
        tech: Some(tech.to_string()),
        ..entry.clone()
    });
    cell.active = active;
    cell.supercharged = supercharged && active;
    cell
}

/// Assigns one-letter codes to names in first-seen order.
#[derive(Default)]
struct CodeTable {
    codes: BTreeMap<String, char>,
    order: Vec<(char, String)>,
}

impl CodeTable {
    const ALPHABET: &'static str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

    fn code_for(&mut self, name: &str) -> Result<char, ShareError> {
        if let Some(code) = self.codes.get(name) {
            return Ok(*code);
        }
        if name.is_empty() || name.contains([SECTION_SEPARATOR, ',']) {
            return Err(ShareError::UnencodableName(name.to_string()));
        }
        let code = Self::ALPHABET
            .chars()
            .nth(self.order.len())
            .ok_or(ShareError::TooManyNames(Self::ALPHABET.len()))?;
        self.codes.insert(name.to_string(), code);
        self.order.push((code, name.to_string()));
        Ok(code)
    }

    fn encode(&self) -> String {
        self.order
            .iter()
            .map(|(code, name)| format!("{code}:{name}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
#[path = "tests/share_tests.rs"]
mod tests;
