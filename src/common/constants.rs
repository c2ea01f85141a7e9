/// Catalog identifier constants to keep registry lookups, configuration and
/// CLI arguments consistent across the codebase.

// VizieR identifiers of the catalogs the engine knows out of the box
pub const TWOMASS_CATALOG: &str = "II/246/out";
pub const GAIA_DR3_CATALOG: &str = "I/355/gaiadr3";
pub const ALLWISE_CATALOG: &str = "II/328/allwise";
pub const SDSS_DR16_CATALOG: &str = "V/154/sdss16";
pub const PANSTARRS_CATALOG: &str = "II/349/ps1";

// Short aliases (used as column prefixes and on the command line)
pub const TWOMASS_ALIAS: &str = "2mass";
pub const GAIA_DR3_ALIAS: &str = "gaia";
pub const ALLWISE_ALIAS: &str = "allwise";
pub const SDSS_DR16_ALIAS: &str = "sdss";
pub const PANSTARRS_ALIAS: &str = "ps1";

// Position columns most VizieR tables use
pub const J2000_RA_COLUMN: &str = "RAJ2000";
pub const J2000_DEC_COLUMN: &str = "DEJ2000";
pub const ICRS_RA_COLUMN: &str = "RA_ICRS";
pub const ICRS_DEC_COLUMN: &str = "DE_ICRS";

pub const TWOMASS_DEFAULT_COLUMNS: &[&str] = &["Jmag", "e_Jmag", "Hmag", "e_Hmag", "Kmag", "e_Kmag"];
pub const GAIA_DR3_DEFAULT_COLUMNS: &[&str] = &[
    "Source", "Gmag", "e_Gmag", "BPmag", "e_BPmag", "RPmag", "e_RPmag", "Plx", "e_Plx",
];
pub const ALLWISE_DEFAULT_COLUMNS: &[&str] = &[
    "W1mag", "e_W1mag", "W2mag", "e_W2mag", "W3mag", "e_W3mag", "W4mag", "e_W4mag",
];
pub const SDSS_DR16_DEFAULT_COLUMNS: &[&str] = &[
    "umag", "e_umag", "gmag", "e_gmag", "rmag", "e_rmag", "imag", "e_imag", "zmag", "e_zmag",
];
pub const PANSTARRS_DEFAULT_COLUMNS: &[&str] = &[
    "gmag", "e_gmag", "rmag", "e_rmag", "imag", "e_imag", "zmag", "e_zmag", "ymag", "e_ymag",
];

// Mandatory columns appended by every enrichment step (after the prefix)
pub const SEPARATION_SUFFIX: &str = "sep_arcsec";
pub const MATCH_RA_SUFFIX: &str = "ra";
pub const MATCH_DEC_SUFFIX: &str = "dec";

// Input table conventions
pub const DEFAULT_DESIGNATION_COLUMN: &str = "designation";
pub const DEFAULT_RA_COLUMN: &str = "ra";
pub const DEFAULT_DEC_COLUMN: &str = "dec";
pub const DEFAULT_DESIGNATION_PREFIX: &str = "J";

/// CDS XMatch refuses uploads beyond this many rows per request.
pub const XMATCH_MAX_BATCH_SIZE: usize = 100_000;

/// Simbad is the reference catalog for name and region resolution.
pub const SIMBAD_SERVICE: &str = "simbad";
pub const VIZIER_SERVICE: &str = "vizier";
pub const XMATCH_SERVICE: &str = "xmatch";

// Simbad field holding the object type code (e.g. `Star`, `BD*`, `QSO`)
pub const OBJECT_TYPE_FIELD: &str = "otype";

/// Get all built-in catalog aliases
pub fn get_supported_catalogs() -> Vec<&'static str> {
    vec![TWOMASS_ALIAS, GAIA_DR3_ALIAS, ALLWISE_ALIAS, SDSS_DR16_ALIAS, PANSTARRS_ALIAS]
}
