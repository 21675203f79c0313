pub(crate) mod typemap;
