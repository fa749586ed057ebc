use {
    super::Runtime,
    crate::{
        error::{Escape, Fatal},
        heap::{Object, Port, PortFlags, PortStatus},
        value::Value,
    },
};

impl Runtime
{
    /// Allocate a binary input port reading from a copy of the bytes.
    pub fn open_input_bytes(&mut self, bytes: &[u8]) -> Result<Value, Fatal>
    {
        let port = Port{
            flags: PortFlags::IN | PortFlags::BINARY,
            status: PortStatus::Open,
            buffer: bytes.to_vec(),
            position: 0,
        };
        Ok(self.allocate(Object::Port(port))?.into())
    }

    /// Allocate a binary output port writing to memory.
    pub fn open_output_bytes(&mut self) -> Result<Value, Fatal>
    {
        let port = Port{
            flags: PortFlags::OUT | PortFlags::BINARY,
            status: PortStatus::Open,
            buffer: Vec::new(),
            position: 0,
        };
        Ok(self.allocate(Object::Port(port))?.into())
    }

    /// Read the next byte, or the end-of-file object.
    pub fn port_read_u8(&mut self, port: Value) -> Result<Value, Escape>
    {
        let input = self.port(port, PortFlags::IN)?;
        match input.buffer.get(input.position).copied() {
            Some(byte) => {
                input.position += 1;
                Ok(Value::Int(byte.into()))
            },
            None => Ok(Value::Eof),
        }
    }

    /// Append bytes to an output port.
    pub fn port_write(&mut self, port: Value, bytes: &[u8]) -> Result<(), Escape>
    {
        self.port(port, PortFlags::OUT)?.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Close a port; closing it again does nothing.
    pub fn port_close(&mut self, port: Value) -> Result<(), Escape>
    {
        match self.port_object(port) {
            Some(port) => {
                port.status = PortStatus::Closed;
                Ok(())
            },
            None => Err(self.error("port required", &[port])),
        }
    }

    /// The bytes written to an output port so far.
    pub fn port_output(&mut self, port: Value) -> Result<Vec<u8>, Escape>
    {
        match self.port_object(port) {
            Some(port) if port.flags.contains(PortFlags::OUT) =>
                Ok(port.buffer.clone()),
            _ => Err(self.error("output port required", &[port])),
        }
    }

    fn port_object(&mut self, port: Value) -> Option<&mut Port>
    {
        match self.heap.get_mut(port.as_object()?) {
            Object::Port(port) => Some(port),
            _ => None,
        }
    }

    /// The port, if it is open and supports the direction.
    fn port(&mut self, port: Value, direction: PortFlags)
        -> Result<&mut Port, Escape>
    {
        let usable = self.port_object(port).map_or(false, |p| {
            p.flags.contains(direction) && p.status == PortStatus::Open
        });
        if !usable {
            let message = if direction == PortFlags::IN {
                "open input port required"
            } else {
                "open output port required"
            };
            return Err(self.error(message, &[port]));
        }
        match self.port_object(port) {
            Some(port) => Ok(port),
            None => unreachable!("Port vanished after checking it"),
        }
    }
}
