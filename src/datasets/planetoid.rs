use std::{
    fmt,
    fs::create_dir_all,
    path::{Path, PathBuf},
    str::FromStr,
};

use candle_core::Device;
use tracing::{debug, info};

use super::{
    edges::edge_index_from_dict,
    graph::GraphRecord,
    index_file::parse_index_file,
    raw::{read_adjacency, RawBlocks},
    split::{reconcile, Split, SplitConfig, NUM_VAL},
    traits::Dataset,
    utils::download_url,
};
use crate::error::{PlanetoidError, Result};

pub const URL: &str = "https://github.com/kimiyoung/planetoid/raw/master/data";

const RAW_ITEMS: [&str; 8] = ["x", "tx", "allx", "y", "ty", "ally", "graph", "test.index"];

/// Which Planetoid dataset, and how its raw files are laid out.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanetoidKind {
    name: String,
    has_isolated_test_nodes: bool,
}

impl PlanetoidKind {
    pub fn new(name: impl Into<String>, has_isolated_test_nodes: bool) -> Self {
        Self {
            name: name.into(),
            has_isolated_test_nodes,
        }
    }
    pub fn cora() -> Self {
        Self::new("Cora", false)
    }
    /// Some CiteSeer nodes have no features, which leaves gaps in its test index.
    pub fn citeseer() -> Self {
        Self::new("CiteSeer", true)
    }
    pub fn pubmed() -> Self {
        Self::new("PubMed", false)
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    /// File prefix of the raw files, `ind.{prefix}.*`.
    pub fn prefix(&self) -> String {
        self.name.to_lowercase()
    }
    pub fn has_isolated_test_nodes(&self) -> bool {
        self.has_isolated_test_nodes
    }
}

impl FromStr for PlanetoidKind {
    type Err = PlanetoidError;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "cora" => Ok(Self::cora()),
            "citeseer" => Ok(Self::citeseer()),
            "pubmed" => Ok(Self::pubmed()),
            _ => Err(PlanetoidError::UnknownDataset(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanetoidParams {
    pub split: Split,
    /// Fetch missing raw files from `url`; otherwise missing files are an error.
    pub download: bool,
    pub url: String,
    pub num_val: usize,
    pub device: Device,
}
impl Default for PlanetoidParams {
    fn default() -> Self {
        Self {
            split: Split::Public,
            download: true,
            url: URL.to_owned(),
            num_val: NUM_VAL,
            device: Device::Cpu,
        }
    }
}

/// Where a [`Planetoid`] is in its download/process/load lifecycle.
#[derive(Debug, Clone)]
pub enum CacheState {
    RawMissing,
    Downloading,
    RawPresent,
    Processing,
    Cached(GraphRecord),
}
impl CacheState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RawMissing => "raw missing",
            Self::Downloading => "downloading",
            Self::RawPresent => "raw present",
            Self::Processing => "processing",
            Self::Cached(_) => "cached",
        }
    }
}

/// The citation networks Cora, CiteSeer and PubMed from "Revisiting
/// Semi-Supervised Learning with Graph Embeddings" (Yang et al., 2016).
///
/// Raw files live in `{root}/{name}/raw`. They are processed once into
/// `{root}/{name}/processed/data.npz`, which later instances load instead.
#[derive(Debug)]
pub struct Planetoid {
    root: PathBuf,
    kind: PlanetoidKind,
    params: PlanetoidParams,
    state: CacheState,
}

impl Planetoid {
    pub fn new<P: AsRef<Path>>(root: P, kind: PlanetoidKind) -> Result<Self> {
        Self::with_params(root, kind, PlanetoidParams::default())
    }

    pub fn with_params<P: AsRef<Path>>(
        root: P,
        kind: PlanetoidKind,
        params: PlanetoidParams,
    ) -> Result<Self> {
        let mut dataset = Self::open(root, kind, params);
        dataset.load_or_build()?;
        Ok(dataset)
    }

    /// A dataset in [`CacheState::RawMissing`] that has not touched the disk yet.
    pub fn open<P: AsRef<Path>>(root: P, kind: PlanetoidKind, params: PlanetoidParams) -> Self {
        Self {
            root: root.as_ref().to_owned(),
            kind,
            params,
            state: CacheState::RawMissing,
        }
    }

    pub fn kind(&self) -> &PlanetoidKind {
        &self.kind
    }
    pub fn split(&self) -> Split {
        self.params.split
    }
    pub fn state(&self) -> &CacheState {
        &self.state
    }
    pub fn raw_dir(&self) -> PathBuf {
        self.root.join(self.kind.name()).join("raw")
    }
    pub fn processed_dir(&self) -> PathBuf {
        self.root.join(self.kind.name()).join("processed")
    }
    pub fn processed_path(&self) -> PathBuf {
        self.processed_dir().join("data.npz")
    }
    pub fn raw_file_names(&self) -> Vec<String> {
        let prefix = self.kind.prefix();
        RAW_ITEMS
            .iter()
            .map(|item| format!("ind.{prefix}.{item}"))
            .collect()
    }
    pub fn raw_paths(&self) -> Vec<PathBuf> {
        let raw_dir = self.raw_dir();
        self.raw_file_names()
            .into_iter()
            .map(|name| raw_dir.join(name))
            .collect()
    }

    /// Downloads whichever raw files are missing. A failed download is fatal
    /// and leaves the dataset in [`CacheState::RawMissing`].
    pub fn ensure_raw_present(&mut self) -> Result<()> {
        let missing = self
            .raw_paths()
            .into_iter()
            .filter(|path| !path.exists())
            .collect::<Vec<_>>();
        if missing.is_empty() {
            self.state = CacheState::RawPresent;
            return Ok(());
        }
        if !self.params.download {
            self.state = CacheState::RawMissing;
            return Err(PlanetoidError::MissingRawFiles(missing));
        }

        self.state = CacheState::Downloading;
        info!("downloading {} raw files of {}", missing.len(), self);
        let raw_dir = self.raw_dir();
        for path in &missing {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            let url = format!("{}/{}", self.params.url, name);
            debug!("GET {url}");
            if let Err(e) = download_url(&url, &raw_dir) {
                self.state = CacheState::RawMissing;
                return Err(e);
            }
        }
        self.state = CacheState::RawPresent;
        Ok(())
    }

    /// Builds the graph from the raw files and persists it.
    pub fn process(&mut self) -> Result<&GraphRecord> {
        if !matches!(self.state, CacheState::RawPresent) {
            return Err(PlanetoidError::NotReady(self.state.name()));
        }
        self.state = CacheState::Processing;
        info!("processing {} from {:?}", self, self.raw_dir());
        match self.build() {
            Ok(record) => self.cache(record),
            Err(e) => {
                self.state = CacheState::RawPresent;
                Err(e)
            }
        }
    }

    /// The cached graph; loads the processed artifact, or downloads and
    /// processes the raw files when there is none yet.
    pub fn load_or_build(&mut self) -> Result<&GraphRecord> {
        if matches!(self.state, CacheState::Cached(_)) {
            return self.cached();
        }
        let path = self.processed_path();
        if path.exists() {
            info!("loading {} from {:?}", self, path);
            let record = GraphRecord::load(&path, &self.params.device)?;
            return self.cache(record);
        }
        self.ensure_raw_present()?;
        self.process()
    }

    pub fn num_features(&self) -> Result<usize> {
        Ok(self.cached()?.num_features())
    }
    pub fn num_classes(&self) -> Result<usize> {
        self.cached()?.num_classes()
    }

    fn build(&self) -> Result<GraphRecord> {
        let record = read_planetoid_data(
            self.raw_dir(),
            &self.kind,
            self.params.num_val,
            &self.params.device,
        )?;
        create_dir_all(self.processed_dir())?;
        record.save(self.processed_path())?;
        Ok(record)
    }

    fn cache(&mut self, record: GraphRecord) -> Result<&GraphRecord> {
        let record = match self.params.split {
            Split::Public => record,
            Split::Full => record.with_full_split()?,
        };
        self.state = CacheState::Cached(record);
        self.cached()
    }

    fn cached(&self) -> Result<&GraphRecord> {
        match &self.state {
            CacheState::Cached(record) => Ok(record),
            state => Err(PlanetoidError::NotReady(state.name())),
        }
    }
}

impl fmt::Display for Planetoid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}()", self.kind.name())
    }
}

impl Dataset for Planetoid {
    type Item = GraphRecord;
    fn len(&self) -> usize {
        1
    }
    fn get(&self, idx: usize) -> Result<&GraphRecord> {
        if idx != 0 {
            return Err(PlanetoidError::InvalidIndexAccess(idx));
        }
        self.cached()
    }
}

/// Reads the `ind.{prefix}.*` files of `folder` into a single graph.
pub fn read_planetoid_data<P: AsRef<Path>>(
    folder: P,
    kind: &PlanetoidKind,
    num_val: usize,
    device: &Device,
) -> Result<GraphRecord> {
    let folder = folder.as_ref();
    let prefix = kind.prefix();
    let raw = RawBlocks::read(folder, &prefix)?;
    let adjacency = read_adjacency(folder.join(format!("ind.{prefix}.graph")))?;
    let test_index = parse_index_file(folder.join(format!("ind.{prefix}.test.index")))?;

    let config = SplitConfig {
        has_isolated_test_nodes: kind.has_isolated_test_nodes(),
        num_val,
    };
    let nodes = reconcile(&raw, &test_index, &config)?;
    let edges = edge_index_from_dict(&adjacency, nodes.num_nodes())?;
    info!(
        "{}: {} nodes, {} features, {} directed edges",
        kind.name(),
        nodes.num_nodes(),
        raw.num_features()?,
        edges.len()
    );
    GraphRecord::assemble(nodes, edges, device)
}
