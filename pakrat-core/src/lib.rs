pub mod audio;
pub mod blc;
pub mod blocktype;
pub mod bnk;
pub mod chacha;
pub mod error;
pub mod mask;
pub mod namemap;
pub mod pck;
pub mod postprocess;
pub mod report;
pub mod script;
pub mod spark;
pub mod usm;
pub mod vfs;
pub mod wire;
pub mod xxtea;
