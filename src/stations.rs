/// Station registry for the Lake Balaton phenology analysis.
///
/// Defines the canonical list of monitoring stations whose concentration
/// records are analysed, along with their metadata. This is the single
/// source of truth for station identifiers: all other modules should
/// reference stations from here rather than hardcoding names.

// ---------------------------------------------------------------------------
// Station metadata
// ---------------------------------------------------------------------------

/// Metadata for a single lake monitoring station.
pub struct Station {
    /// Identifier used in the observation table's `station_id` column.
    pub id: &'static str,
    /// Roman-numeral basin label used in published tables.
    pub label: &'static str,
    /// Human-readable station name.
    pub name: &'static str,
    /// Role of the station in the lake's west–east trophic gradient.
    pub description: &'static str,
    /// WGS84 latitude (approximate pelagic sampling point).
    pub latitude: f64,
    /// WGS84 longitude (approximate pelagic sampling point).
    pub longitude: f64,
}

/// All stations, ordered west to east along the lake's long axis. The
/// western basin receives the Zala inflow and is the most eutrophic.
pub static STATION_REGISTRY: &[Station] = &[
    Station {
        id: "Keszthely",
        label: "I",
        name: "Keszthely basin",
        description: "Westernmost basin next to the Zala inflow and the \
                      Kis-Balaton wetland. Highest nutrient load; earliest \
                      and strongest summer blooms.",
        latitude: 46.7370,
        longitude: 17.2740,
    },
    Station {
        id: "Szigliget",
        label: "II",
        name: "Szigliget basin",
        description: "Second basin; transitional between the eutrophic west \
                      and the mesotrophic central lake.",
        latitude: 46.7830,
        longitude: 17.4330,
    },
    Station {
        id: "Zanka",
        label: "III",
        name: "Szemes basin at Zanka",
        description: "Central basin. Its 2015-2023 satellite peak is \
                      replaced by an in-situ value, see \
                      `analysis::aggregate::lake_balaton_overrides`.",
        latitude: 46.8560,
        longitude: 17.6970,
    },
    Station {
        id: "Tihany",
        label: "IV-1",
        name: "Siófok basin off Tihany",
        description: "Eastern basin just east of the Tihany peninsula strait.",
        latitude: 46.9000,
        longitude: 17.9050,
    },
    Station {
        id: "Bfuzfo",
        label: "IV-2",
        name: "Siófok basin at Balatonfűzfő",
        description: "Easternmost station near the outflow; least productive.",
        latitude: 47.0470,
        longitude: 18.0370,
    },
];

/// Returns the ids of all registered stations in registry order.
pub fn all_station_ids() -> Vec<&'static str> {
    STATION_REGISTRY.iter().map(|s| s.id).collect()
}

/// Looks up a station by id. Returns `None` if not found.
pub fn find_station(id: &str) -> Option<&'static Station> {
    STATION_REGISTRY.iter().find(|s| s.id == id)
}

/// Published basin label for a station id, or the id itself for stations
/// outside the registry.
pub fn label_for(id: &str) -> &str {
    find_station(id).map(|s| s.label).unwrap_or(id)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
