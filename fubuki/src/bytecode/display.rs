use {super::{Irep, Op}, std::fmt};

impl fmt::Display for Irep
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        write!(f, "; argc {}, locals {}", self.argc, self.localc)?;
        if self.varg {
            write!(f, ", rest")?;
        }
        if !self.captured.is_empty() {
            write!(f, ", captured {:?}", self.captured)?;
        }
        writeln!(f)?;
        for (i, instruction) in self.code.iter().enumerate() {
            writeln!(f, "{i:>6} {instruction}")?;
        }
        for (i, constant) in self.pool.iter().enumerate() {
            writeln!(f, "{:>6} {constant}", format!("#{i}"))?;
        }
        Ok(())
    }
}

impl fmt::Display for Op
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result
    {
        match self {
            Self::Nop               => write!(f, "NOP"),
            Self::Pop               => write!(f, "POP"),
            Self::PushNil           => write!(f, "PUSH_NIL"),
            Self::PushTrue          => write!(f, "PUSH_TRUE"),
            Self::PushFalse         => write!(f, "PUSH_FALSE"),
            Self::PushNone          => write!(f, "PUSH_NONE"),
            Self::PushInt(i)        => write!(f, "PUSH_INT    {i}"),
            Self::PushFloat(x)      => write!(f, "PUSH_FLOAT  {x:?}"),
            Self::PushChar(c)       => write!(f, "PUSH_CHAR   {c:?}"),
            Self::PushConst(c)      => write!(f, "PUSH_CONST  #{c}"),
            Self::GRef(name)        => write!(f, "GREF        {name:?}"),
            Self::GSet(name)        => write!(f, "GSET        {name:?}"),
            Self::LRef(l)           => write!(f, "LREF        {l}"),
            Self::LSet(l)           => write!(f, "LSET        {l}"),
            Self::CRef{depth, index} => write!(f, "CREF        {depth}, {index}"),
            Self::CSet{depth, index} => write!(f, "CSET        {depth}, {index}"),
            Self::Jmp(target)       => write!(f, "JMP         @{target}"),
            Self::JmpIf(target)     => write!(f, "JMPIF       @{target}"),
            Self::Call(argc)        => write!(f, "CALL        {argc}"),
            Self::TailCall(argc)    => write!(f, "TAILCALL    {argc}"),
            Self::Ret               => write!(f, "RET"),
            Self::Lambda(p)         => write!(f, "LAMBDA      {p}"),
            Self::Cons              => write!(f, "CONS"),
            Self::Car               => write!(f, "CAR"),
            Self::Cdr               => write!(f, "CDR"),
            Self::NilP              => write!(f, "NILP"),
            Self::Add               => write!(f, "ADD"),
            Self::Sub               => write!(f, "SUB"),
            Self::Mul               => write!(f, "MUL"),
            Self::Div               => write!(f, "DIV"),
            Self::Minus             => write!(f, "MINUS"),
            Self::Eq                => write!(f, "EQ"),
            Self::Lt                => write!(f, "LT"),
            Self::Le                => write!(f, "LE"),
            Self::PushRescue(target) => write!(f, "PUSH_RESCUE @{target}"),
            Self::PopRescue         => write!(f, "POP_RESCUE"),
        }
    }
}
