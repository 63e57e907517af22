//! Context assembly for one exchange.
//!
//! # Blocks (in injection order)
//!
//! | Block | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | 1. Preamble | Fixed persona | Never trimmed |
//! | 2. Grow | Grow state collaborator | Omitted when unavailable |
//! | 3. Knowledge | Semantic search | Lowest-similarity passages dropped |
//! | 4. Summary | Latest conversation summary | Omitted when absent |
//! | 5. History | Recent turns | Oldest turns dropped |
//! | 6. User message | The request | Never trimmed |

pub mod assembler;
pub mod grow_context;
pub mod knowledge;
pub mod preamble;
pub mod token;

pub use assembler::{
    AssembledContext, AssemblyMetadata, ContextAssembler, ContextSource, DropInfo, HistoryWindow,
    LayerStats, TokenBudget, trim_history_to_budget,
};
pub use grow_context::{GrowContext, GrowContextFormatter};
pub use knowledge::{KnowledgeBlock, KnowledgeRetriever, RetrievalSettings};
