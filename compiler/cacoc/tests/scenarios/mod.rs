mod access;
mod calls;
mod classification;
mod errors;
mod frames;
mod stack_space;
