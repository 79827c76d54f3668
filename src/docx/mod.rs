pub mod opc;
pub mod package;
pub mod props;
pub mod shadow;
pub mod template;
pub mod xml;
